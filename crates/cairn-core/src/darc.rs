//! Versioned access-control documents
//!
//! A darc guards every mutable object on the ledger: it maps action names
//! to [`RuleExpression`]s deciding who may invoke that action. Darcs are
//! immutable value objects — "changing" one means evolving it into a new
//! document with the same base id and version + 1, then submitting the
//! candidate in an `invoke` instruction authorized by the previous
//! version's evolve rule. The current version of a darc is a position in
//! an append-only version log, never an in-place mutation.

use crate::errors::{CoreError, Result};
use crate::expression::{Combinator, RuleExpression};
use crate::hash;
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Action gating who may sign on behalf of the darc
pub const RULE_SIGN: &str = "_sign";

/// Action gating who may evolve the darc to its next version
pub const RULE_EVOLVE: &str = "invoke:darc.evolve";

/// Recovery action bypassing the ordinary evolve rule
pub const RULE_EVOLVE_UNRESTRICTED: &str = "invoke:darc.evolve_unrestricted";

/// Stable 32-byte identifier of a darc
///
/// The *base id* of a document never changes across evolutions; the id of
/// an individual version is the hash of that version's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DarcId([u8; 32]);

impl DarcId {
    /// Wrap raw digest bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CoreError::invalid_identity(format!("bad darc id hex: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_identity("darc id is not 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for DarcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Ordered action → rule mapping of one darc version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    rules: BTreeMap<String, RuleExpression>,
}

impl Rules {
    /// Empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set for a basic darc: `signers` may sign, `evolvers` may evolve
    pub fn basic(signers: &[Identity], evolvers: &[Identity]) -> Self {
        let mut rules = Self::new();
        rules.set_rule(RULE_SIGN, RuleExpression::any_of(signers));
        rules.set_rule(RULE_EVOLVE, RuleExpression::any_of(evolvers));
        rules
    }

    /// Replace the rule for `action` wholesale; idempotent
    pub fn set_rule(&mut self, action: impl Into<String>, expr: RuleExpression) {
        self.rules.insert(action.into(), expr);
    }

    /// The rule for `action`, if any
    pub fn get(&self, action: &str) -> Option<&RuleExpression> {
        self.rules.get(action)
    }

    /// The rule for `action`, treating absence as the empty expression
    pub fn expression(&self, action: &str) -> RuleExpression {
        self.rules.get(action).cloned().unwrap_or_default()
    }

    /// Combine `identity` into the rule for `action`
    ///
    /// An absent rule is treated as empty, so the first OR-append creates
    /// the rule. Malformed existing rule text is a hard failure.
    pub fn append_to_rule(
        &mut self,
        action: impl Into<String>,
        identity: &Identity,
        combinator: Combinator,
    ) -> Result<()> {
        let action = action.into();
        let appended = self.expression(&action).append(identity, combinator)?;
        self.rules.insert(action, appended);
        Ok(())
    }

    /// Remove `identity` from the rule for `action`
    ///
    /// A missing rule or absent identity is a deliberate no-op.
    pub fn remove_from_rule(&mut self, action: &str, identity: &Identity) -> Result<()> {
        let Some(existing) = self.rules.get(action) else {
            debug!(action, %identity, "remove_from_rule: no such rule, ignoring");
            return Ok(());
        };
        let removed = existing.remove(identity)?;
        if &removed == existing {
            debug!(action, %identity, "remove_from_rule: identity not present, ignoring");
        }
        self.rules.insert(action.to_string(), removed);
        Ok(())
    }

    /// Iterate over (action, expression) pairs in action order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleExpression)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of actions carrying a rule
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no action carries a rule
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Field-level updates applied by an evolution
#[derive(Debug, Clone, Default)]
pub struct DarcUpdate {
    /// Replacement rule set, if changing
    pub rules: Option<Rules>,
    /// Replacement description, if changing
    pub description: Option<String>,
}

/// One immutable version of an access-control document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darc {
    version: u64,
    description: String,
    rules: Rules,
    /// Base id carried forward from version 0; `None` on version 0 itself,
    /// where the base id is this document's own content hash.
    prev_base: Option<DarcId>,
}

impl Darc {
    /// Create a version-0 darc
    pub fn new(rules: Rules, description: impl Into<String>) -> Self {
        Self {
            version: 0,
            description: description.into(),
            rules,
            prev_base: None,
        }
    }

    /// Version-0 darc where `signers` may sign and `evolvers` may evolve
    pub fn basic(
        signers: &[Identity],
        evolvers: &[Identity],
        description: impl Into<String>,
    ) -> Self {
        Self::new(Rules::basic(signers, evolvers), description)
    }

    /// This version's content hash
    ///
    /// Fields are fed to the digest length-prefixed, in a fixed order;
    /// rule iteration order is the action order of the map, so the id is
    /// deterministic across processes.
    pub fn id(&self) -> DarcId {
        let mut h = hash::hasher();
        h.update(b"darc");
        h.update(&self.version.to_le_bytes());
        match &self.prev_base {
            Some(base) => {
                h.update(&[1]);
                h.update(base.as_bytes());
            }
            None => {
                h.update(&[0]);
            }
        }
        h.update(&(self.description.len() as u64).to_le_bytes());
        h.update(self.description.as_bytes());
        for (action, expr) in self.rules.iter() {
            h.update(&(action.len() as u64).to_le_bytes());
            h.update(action.as_bytes());
            h.update(&(expr.as_str().len() as u64).to_le_bytes());
            h.update(expr.as_str().as_bytes());
        }
        DarcId::new(*h.finalize().as_bytes())
    }

    /// The stable identifier shared by every version of this document
    pub fn base_id(&self) -> DarcId {
        self.prev_base.unwrap_or_else(|| self.id())
    }

    /// Version number, starting at 0
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The action → rule mapping of this version
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Construct the next version of this document
    ///
    /// The result keeps the base id, bumps the version by exactly one and
    /// applies the field-level updates. Nothing is submitted: the caller
    /// wraps the candidate into an `invoke` instruction against the base
    /// id using the `evolve` (or `evolve_unrestricted`) command, which the
    /// ledger authorizes against the *previous* version's rule.
    pub fn evolve(&self, update: DarcUpdate) -> Darc {
        Darc {
            version: self.version + 1,
            description: update.description.unwrap_or_else(|| self.description.clone()),
            rules: update.rules.unwrap_or_else(|| self.rules.clone()),
            prev_base: Some(self.base_id()),
        }
    }

    /// Canonical byte encoding, used as the instruction argument payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CoreError::serialization(e.to_string()))
    }

    /// Decode from the canonical byte encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| CoreError::serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeyPair;

    fn id(n: u8) -> Identity {
        KeyPair::from_seed([n; 32]).identity()
    }

    #[test]
    fn evolution_preserves_base_id_and_bumps_version() {
        let darc = Darc::basic(&[id(1)], &[id(1)], "user");
        let base = darc.base_id();

        let v1 = darc.evolve(DarcUpdate::default());
        let v2 = v1.evolve(DarcUpdate {
            description: Some("user-renamed".into()),
            ..Default::default()
        });

        assert_eq!(v1.version(), 1);
        assert_eq!(v2.version(), 2);
        assert_eq!(v1.base_id(), base);
        assert_eq!(v2.base_id(), base);
        assert_ne!(v1.id(), darc.id());
        assert_eq!(v2.description(), "user-renamed");
    }

    #[test]
    fn basic_darc_grants_sign_and_evolve() {
        let darc = Darc::basic(&[id(1), id(2)], &[id(1)], "shared");
        let sign = darc.rules().expression(RULE_SIGN);
        let evolve = darc.rules().expression(RULE_EVOLVE);

        assert!(sign.matches(&[id(2)]).unwrap());
        assert!(!evolve.matches(&[id(2)]).unwrap());
        assert!(evolve.matches(&[id(1)]).unwrap());
    }

    #[test]
    fn rule_mutation_round_trip() {
        let mut rules = Rules::basic(&[id(1)], &[id(1)]);
        let before = rules.expression(RULE_SIGN);

        rules
            .append_to_rule(RULE_SIGN, &id(2), Combinator::Or)
            .unwrap();
        assert!(rules.expression(RULE_SIGN).matches(&[id(2)]).unwrap());

        rules.remove_from_rule(RULE_SIGN, &id(2)).unwrap();
        assert_eq!(rules.expression(RULE_SIGN), before);
    }

    #[test]
    fn append_creates_missing_rule() {
        let mut rules = Rules::new();
        rules
            .append_to_rule("invoke:coin.fetch", &id(4), Combinator::Or)
            .unwrap();
        assert!(rules
            .expression("invoke:coin.fetch")
            .matches(&[id(4)])
            .unwrap());
    }

    #[test]
    fn remove_from_missing_rule_is_silent() {
        let mut rules = Rules::new();
        rules.remove_from_rule(RULE_SIGN, &id(1)).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn evolved_candidate_round_trips_through_bytes() {
        let darc = Darc::basic(&[id(1)], &[id(1)], "device").evolve(DarcUpdate::default());
        let decoded = Darc::from_bytes(&darc.to_bytes().unwrap()).unwrap();
        assert_eq!(darc, decoded);
        assert_eq!(decoded.base_id(), darc.base_id());
    }
}
