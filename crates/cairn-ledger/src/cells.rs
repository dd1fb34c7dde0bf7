//! Reactive darc cells
//!
//! A [`DarcCell`] republishes the latest known version of one darc —
//! including candidates evolved locally but not yet confirmed on the
//! ledger — together with an auxiliary cell tracking its membership
//! proof. A [`DarcsCell`] wraps an ordered collection of member cells and
//! republishes the whole collection whenever any member updates, keeping
//! every member at its original position. Dependent transaction-building
//! logic subscribes once and always observes the current authorized
//! state, without polling.

use crate::builder::TransactionBuilder;
use crate::client::MembershipProof;
use crate::errors::Result;
use crate::instruction::{commands, contracts, Argument};
use crate::spawner::ARG_DARC;
use cairn_cell::{Cell, Subscription};
use cairn_core::{
    Combinator, Darc, DarcUpdate, Identity, RuleExpression, RULE_EVOLVE, RULE_SIGN,
};
use tracing::debug;

/// Reactive view of one darc and its ledger-membership proof
#[derive(Clone)]
pub struct DarcCell {
    darc: Cell<Darc>,
    proof: Cell<Option<MembershipProof>>,
}

impl DarcCell {
    /// A cell starting at `initial`, with no proof yet
    pub fn new(initial: Darc) -> Self {
        Self {
            darc: Cell::new(initial),
            proof: Cell::new(None),
        }
    }

    /// A cell adopting every value published by `upstream`
    ///
    /// This is how a background chain-sync feed becomes visible to
    /// transaction builders. Requires a tokio runtime.
    pub fn chain(upstream: &Cell<Darc>) -> Self {
        Self {
            darc: Cell::chain(upstream),
            proof: Cell::new(None),
        }
    }

    /// The latest known version of the darc
    pub fn get(&self) -> Darc {
        self.darc.get()
    }

    /// Subscribe to darc updates (current value first, then in order)
    pub fn subscribe(&self) -> Subscription<Darc> {
        self.darc.subscribe()
    }

    /// The underlying darc cell
    pub fn darc_cell(&self) -> &Cell<Darc> {
        &self.darc
    }

    /// The auxiliary proof cell
    pub fn proof_cell(&self) -> &Cell<Option<MembershipProof>> {
        &self.proof
    }

    /// Publish fresh inclusion evidence for the current version
    pub fn set_proof(&self, proof: MembershipProof) {
        self.proof.publish(Some(proof));
    }

    /// Build the next version and append the authorizing instruction
    ///
    /// The candidate keeps the base id and bumps the version; the invoke
    /// targets the base id with the `evolve` command, or
    /// `evolve_unrestricted` when `unrestricted` — the recovery path that
    /// bypasses the ordinary evolve rule and needs its own, higher
    /// authorization. Nothing is submitted here, and the cell itself is
    /// only updated once the upstream source confirms the new version.
    pub fn evolve(
        &self,
        tx: &mut TransactionBuilder,
        update: DarcUpdate,
        unrestricted: bool,
    ) -> Result<Darc> {
        let candidate = self.get().evolve(update);
        let command = if unrestricted {
            commands::EVOLVE_UNRESTRICTED
        } else {
            commands::EVOLVE
        };
        debug!(
            base = %candidate.base_id(),
            version = candidate.version(),
            command,
            "appending darc evolution"
        );
        tx.invoke(
            candidate.base_id().into(),
            contracts::DARC,
            command,
            vec![Argument::new(ARG_DARC, candidate.to_bytes()?)],
        );
        Ok(candidate)
    }

    /// Replace the sign rule — and by default the evolve rule — wholesale
    ///
    /// Who may act and who may change who-may-act move together unless
    /// the caller explicitly opts out with `id_evolve = None`.
    pub fn set_sign_evolve(
        &self,
        tx: &mut TransactionBuilder,
        id_sign: Identity,
        id_evolve: Option<Identity>,
    ) -> Result<Darc> {
        let mut rules = self.get().rules().clone();
        rules.set_rule(RULE_SIGN, RuleExpression::single(&id_sign));
        if let Some(id_evolve) = id_evolve {
            rules.set_rule(RULE_EVOLVE, RuleExpression::single(&id_evolve));
        }
        self.evolve(
            tx,
            DarcUpdate {
                rules: Some(rules),
                description: None,
            },
            false,
        )
    }

    /// OR-append a signer to the sign rule — and by default the evolve rule
    pub fn add_sign_evolve(
        &self,
        tx: &mut TransactionBuilder,
        id_sign: Identity,
        id_evolve: Option<Identity>,
    ) -> Result<Darc> {
        let mut rules = self.get().rules().clone();
        rules.append_to_rule(RULE_SIGN, &id_sign, Combinator::Or)?;
        if let Some(id_evolve) = id_evolve {
            rules.append_to_rule(RULE_EVOLVE, &id_evolve, Combinator::Or)?;
        }
        self.evolve(
            tx,
            DarcUpdate {
                rules: Some(rules),
                description: None,
            },
            false,
        )
    }

    /// Remove a signer from both the sign and evolve rules
    pub fn rm_sign_evolve(&self, tx: &mut TransactionBuilder, id: Identity) -> Result<Darc> {
        let mut rules = self.get().rules().clone();
        rules.remove_from_rule(RULE_SIGN, &id)?;
        rules.remove_from_rule(RULE_EVOLVE, &id)?;
        self.evolve(
            tx,
            DarcUpdate {
                rules: Some(rules),
                description: None,
            },
            false,
        )
    }
}

impl std::fmt::Debug for DarcCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let darc = self.darc.get();
        f.debug_struct("DarcCell")
            .field("base", &darc.base_id().to_string())
            .field("version", &darc.version())
            .finish()
    }
}

/// Reactive view of an ordered darc collection
///
/// Owns its member cells; each member update republishes the whole
/// collection exactly once, with the updated member at its original
/// position.
pub struct DarcsCell {
    members: Vec<DarcCell>,
    collection: Cell<Vec<Darc>>,
}

impl DarcsCell {
    /// Build the collection cell over `members`; requires a tokio runtime
    pub fn new(members: Vec<DarcCell>) -> Self {
        // Subscribe before snapshotting so no member update can fall
        // between the snapshot and the forwarding tasks.
        let mut subs: Vec<Subscription<Darc>> =
            members.iter().map(|m| m.darc_cell().subscribe()).collect();
        let snapshot: Vec<Darc> = subs
            .iter_mut()
            .zip(&members)
            .map(|(sub, member)| sub.try_recv().unwrap_or_else(|| member.get()))
            .collect();

        let collection = Cell::new(snapshot);
        for (index, mut sub) in subs.into_iter().enumerate() {
            let weak = collection.downgrade();
            tokio::spawn(async move {
                while let Some(darc) = sub.recv().await {
                    let Some(cell) = weak.upgrade() else {
                        break;
                    };
                    cell.update(|collection| collection[index] = darc.clone());
                }
                debug!(index, "darc collection member feed closed");
            });
        }

        Self {
            members,
            collection,
        }
    }

    /// The member cells, in collection order
    pub fn members(&self) -> &[DarcCell] {
        &self.members
    }

    /// Snapshot of the collection
    pub fn get(&self) -> Vec<Darc> {
        self.collection.get()
    }

    /// Subscribe to collection updates (current value first)
    pub fn subscribe(&self) -> Subscription<Vec<Darc>> {
        self.collection.subscribe()
    }
}

impl std::fmt::Debug for DarcsCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DarcsCell")
            .field("members", &self.members.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawner::FeeSchedule;
    use crate::testing::StubLedger;
    use cairn_core::KeyPair;
    use std::sync::Arc;

    fn identity(n: u8) -> Identity {
        KeyPair::from_seed([n; 32]).identity()
    }

    fn darc(n: u8) -> Darc {
        Darc::basic(&[identity(n)], &[identity(n)], format!("member-{n}"))
    }

    fn builder() -> TransactionBuilder {
        TransactionBuilder::new(Arc::new(StubLedger::new(FeeSchedule::default())))
    }

    #[tokio::test]
    async fn member_update_republishes_collection_once_in_place() {
        let upstreams: Vec<Cell<Darc>> = (1..=3).map(|n| Cell::new(darc(n))).collect();
        let members: Vec<DarcCell> = upstreams.iter().map(DarcCell::chain).collect();
        let cells = DarcsCell::new(members);

        let mut sub = cells.subscribe();
        let initial = sub.try_recv().expect("current value is queued");
        assert_eq!(initial.len(), 3);

        // Update member #2 through its upstream feed.
        let evolved = darc(2).evolve(DarcUpdate::default());
        upstreams[1].publish(evolved.clone());

        let updated = sub.recv().await.expect("one collection notification");
        assert_eq!(updated.len(), 3);
        assert_eq!(updated[1], evolved);
        assert_eq!(updated[0], initial[0]);
        assert_eq!(updated[2], initial[2]);

        // Exactly one notification for one member update.
        tokio::task::yield_now().await;
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn evolve_appends_authorized_invoke() {
        let cell = DarcCell::new(darc(1));
        let mut tx = builder();

        let candidate = cell.evolve(&mut tx, DarcUpdate::default(), false).unwrap();
        assert_eq!(candidate.version(), 1);
        assert_eq!(candidate.base_id(), cell.get().base_id());

        let instructions = tx.instructions();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].target, candidate.base_id().into());
        assert!(matches!(
            &instructions[0].kind,
            crate::instruction::InstructionKind::Invoke { contract, command, .. }
                if contract == contracts::DARC && command == commands::EVOLVE
        ));
        // The cell still shows the confirmed version.
        assert_eq!(cell.get().version(), 0);
    }

    #[test]
    fn unrestricted_evolution_uses_recovery_command() {
        let cell = DarcCell::new(darc(1));
        let mut tx = builder();
        cell.evolve(&mut tx, DarcUpdate::default(), true).unwrap();
        assert!(matches!(
            &tx.instructions()[0].kind,
            crate::instruction::InstructionKind::Invoke { command, .. }
                if command == commands::EVOLVE_UNRESTRICTED
        ));
    }

    #[test]
    fn add_sign_evolve_links_both_rules() {
        let cell = DarcCell::new(darc(1));
        let mut tx = builder();

        let candidate = cell
            .add_sign_evolve(&mut tx, identity(2), Some(identity(2)))
            .unwrap();
        assert!(candidate
            .rules()
            .expression(RULE_SIGN)
            .matches(&[identity(2)])
            .unwrap());
        assert!(candidate
            .rules()
            .expression(RULE_EVOLVE)
            .matches(&[identity(2)])
            .unwrap());
        // The original signer keeps access: this was an OR-append.
        assert!(candidate
            .rules()
            .expression(RULE_SIGN)
            .matches(&[identity(1)])
            .unwrap());
    }

    #[test]
    fn opting_out_of_evolve_keeps_evolve_rule() {
        let cell = DarcCell::new(darc(1));
        let mut tx = builder();

        let candidate = cell.set_sign_evolve(&mut tx, identity(2), None).unwrap();
        assert!(!candidate
            .rules()
            .expression(RULE_SIGN)
            .matches(&[identity(1)])
            .unwrap());
        // Evolve rights untouched.
        assert!(candidate
            .rules()
            .expression(RULE_EVOLVE)
            .matches(&[identity(1)])
            .unwrap());
    }

    #[test]
    fn rm_sign_evolve_revokes_both_rules() {
        let cell = DarcCell::new(Darc::basic(
            &[identity(1), identity(2)],
            &[identity(1), identity(2)],
            "shared",
        ));
        let mut tx = builder();

        let candidate = cell.rm_sign_evolve(&mut tx, identity(2)).unwrap();
        assert!(!candidate
            .rules()
            .expression(RULE_SIGN)
            .matches(&[identity(2)])
            .unwrap());
        assert!(!candidate
            .rules()
            .expression(RULE_EVOLVE)
            .matches(&[identity(2)])
            .unwrap());
        assert!(candidate
            .rules()
            .expression(RULE_SIGN)
            .matches(&[identity(1)])
            .unwrap());
    }

    #[test]
    fn proof_cell_publishes_evidence() {
        let cell = DarcCell::new(darc(1));
        let mut sub = cell.proof_cell().subscribe();
        assert_eq!(sub.try_recv(), Some(None));

        let proof = MembershipProof {
            instance: cell.get().base_id().into(),
            block_index: 3,
            value: vec![1],
        };
        cell.set_proof(proof.clone());
        assert_eq!(sub.try_recv(), Some(Some(proof)));
    }
}
