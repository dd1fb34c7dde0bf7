//! In-process ledger stub
//!
//! [`StubLedger`] implements [`LedgerClient`] against in-memory state:
//! a darc registry, instance table and coin balances. Authorization is
//! checked the way the real ledger checks it — signatures are verified
//! against the transaction's signing messages, darc delegation is
//! resolved to a fixed point, and the governing rule is evaluated — so
//! tests exercise real rule semantics without a network. Rejection
//! reasons name the unsatisfied rule verbatim.

use crate::client::{LedgerClient, MembershipProof, TransactionAck};
use crate::errors::{LedgerError, Result};
use crate::instruction::{
    commands, contracts, ClientTransaction, InstanceId, Instruction, InstructionKind,
};
use crate::spawner::{FeeSchedule, SpawnerHandle, ARG_COINS, ARG_DARC, ARG_DARC_ID};
use async_trait::async_trait;
use cairn_core::{Darc, DarcId, Identity, RULE_EVOLVE, RULE_EVOLVE_UNRESTRICTED, RULE_SIGN};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredInstance {
    value: Vec<u8>,
    governing: Option<DarcId>,
    balance: u64,
}

#[derive(Debug, Clone)]
struct StubState {
    spawner: SpawnerHandle,
    darcs: HashMap<DarcId, Darc>,
    instances: HashMap<InstanceId, StoredInstance>,
    accepted: Vec<ClientTransaction>,
    block_index: u64,
    force_timeout: bool,
}

/// An in-memory ledger with real authorization checks
pub struct StubLedger {
    state: Mutex<StubState>,
}

impl StubLedger {
    /// A stub charging fees per `costs`
    pub fn new(costs: FeeSchedule) -> Self {
        let spawner = SpawnerHandle {
            id: InstanceId::derived("spawner", b"stub"),
            costs,
        };
        let mut instances = HashMap::new();
        instances.insert(
            spawner.id,
            StoredInstance {
                value: Vec::new(),
                governing: None,
                balance: 0,
            },
        );
        Self {
            state: Mutex::new(StubState {
                spawner,
                darcs: HashMap::new(),
                instances,
                accepted: Vec::new(),
                block_index: 0,
                force_timeout: false,
            }),
        }
    }

    /// Register `darc` as already existing on the ledger
    pub fn register_darc(&self, darc: &Darc) {
        let mut state = self.lock();
        let base = darc.base_id();
        state.instances.insert(
            base.into(),
            StoredInstance {
                value: darc.to_bytes().unwrap_or_default(),
                governing: Some(base),
                balance: 0,
            },
        );
        state.darcs.insert(base, darc.clone());
    }

    /// Register a coin account with `balance`, governed by `darc`
    pub fn register_coin(&self, instance: InstanceId, darc: DarcId, balance: u64) {
        self.lock().instances.insert(
            instance,
            StoredInstance {
                value: balance.to_le_bytes().to_vec(),
                governing: Some(darc),
                balance,
            },
        );
    }

    /// The stub's spawner authority
    pub fn spawner_handle(&self) -> SpawnerHandle {
        self.lock().spawner.clone()
    }

    /// Balance of a registered coin account
    pub fn balance(&self, instance: InstanceId) -> Option<u64> {
        self.lock().instances.get(&instance).map(|i| i.balance)
    }

    /// The latest registered version of a darc
    pub fn darc(&self, base: DarcId) -> Option<Darc> {
        self.lock().darcs.get(&base).cloned()
    }

    /// Transactions accepted so far, in order
    pub fn accepted(&self) -> Vec<ClientTransaction> {
        self.lock().accepted.clone()
    }

    /// Make every waited submission time out instead of committing
    pub fn force_timeout(&self, on: bool) {
        self.lock().force_timeout = on;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Signer identities carried by valid signatures on instruction `index`
fn verified_signers(tx: &ClientTransaction, index: usize) -> std::result::Result<Vec<Identity>, String> {
    let instruction = &tx.instructions()[index];
    if instruction.signatures.is_empty() {
        return Err(format!("instruction {index}: no signatures"));
    }
    let message = tx.signing_message(index);
    let mut signers = Vec::new();
    for sig in &instruction.signatures {
        match sig.verify(&message) {
            Ok(true) => signers.push(sig.signer),
            _ => return Err(format!("instruction {index}: invalid signature")),
        }
    }
    Ok(signers)
}

/// Close `signers` under darc delegation
///
/// A darc identity joins the set when its `_sign` rule is satisfied by
/// the current set; repeat until nothing more joins.
fn expand_signers(darcs: &HashMap<DarcId, Darc>, mut signers: Vec<Identity>) -> Vec<Identity> {
    loop {
        let mut grew = false;
        for (base, darc) in darcs {
            let identity = Identity::Darc(*base);
            if signers.contains(&identity) {
                continue;
            }
            let satisfied = darc
                .rules()
                .expression(RULE_SIGN)
                .matches(&signers)
                .unwrap_or(false);
            if satisfied {
                signers.push(identity);
                grew = true;
            }
        }
        if !grew {
            return signers;
        }
    }
}

fn check_rule(
    darcs: &HashMap<DarcId, Darc>,
    base: DarcId,
    rule: &str,
    signers: &[Identity],
    index: usize,
) -> std::result::Result<(), String> {
    let darc = darcs
        .get(&base)
        .ok_or_else(|| format!("instruction {index}: unknown darc {base}"))?;
    let satisfied = darc
        .rules()
        .expression(rule)
        .matches(signers)
        .map_err(|e| format!("instruction {index}: {e}"))?;
    if satisfied {
        Ok(())
    } else {
        Err(format!(
            "instruction {index}: rule \"{rule}\" of darc {base} not satisfied"
        ))
    }
}

/// Apply one instruction to the working state, or explain the rejection
fn apply_instruction(
    state: &mut StubState,
    tx: &ClientTransaction,
    index: usize,
) -> std::result::Result<(), String> {
    let instruction: &Instruction = &tx.instructions()[index];
    let signers = expand_signers(&state.darcs, verified_signers(tx, index)?);

    match &instruction.kind {
        InstructionKind::Spawn { contract, .. } if contract == contracts::DARC => {
            let bytes = instruction
                .arg(ARG_DARC)
                .ok_or_else(|| format!("instruction {index}: missing darc argument"))?;
            let darc = Darc::from_bytes(bytes)
                .map_err(|e| format!("instruction {index}: undecodable darc: {e}"))?;
            // A freshly spawned darc must be controlled by its spawners.
            let base = darc.base_id();
            let satisfied = darc
                .rules()
                .expression(RULE_SIGN)
                .matches(&signers)
                .map_err(|e| format!("instruction {index}: {e}"))?;
            if !satisfied {
                return Err(format!(
                    "instruction {index}: rule \"{RULE_SIGN}\" of spawned darc {base} not satisfied"
                ));
            }
            state.instances.insert(
                base.into(),
                StoredInstance {
                    value: bytes.to_vec(),
                    governing: Some(base),
                    balance: 0,
                },
            );
            state.darcs.insert(base, darc);
            Ok(())
        }
        InstructionKind::Spawn { contract, .. } => {
            // Every other spawn is a paid service of the spawner, except
            // secret-reads which target their write object.
            if instruction.target != state.spawner.id && contract != contracts::SECRET_READ {
                return Err(format!(
                    "instruction {index}: spawning {contract} requires the spawner"
                ));
            }
            if contract == contracts::SECRET_READ
                && !state.instances.contains_key(&instruction.target)
            {
                return Err(format!(
                    "instruction {index}: unknown write instance {}",
                    instruction.target
                ));
            }
            let governing = instruction
                .arg(ARG_DARC_ID)
                .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
                .map(DarcId::new);
            let seed_arg = match contract.as_str() {
                contracts::COIN => crate::spawner::ARG_COIN_ID,
                contracts::CREDENTIAL => crate::spawner::ARG_CRED_ID,
                _ => crate::spawner::ARG_PRE_ID,
            };
            let seed = instruction
                .arg(seed_arg)
                .ok_or_else(|| format!("instruction {index}: missing {seed_arg} argument"))?;
            let instance = InstanceId::derived(contract, seed);
            let balance = instruction
                .arg(crate::spawner::ARG_COIN_VALUE)
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(u64::from_le_bytes)
                .unwrap_or(0);
            let value = match contract.as_str() {
                contracts::COIN => balance.to_le_bytes().to_vec(),
                contracts::CREDENTIAL => instruction
                    .arg(crate::spawner::ARG_CREDENTIAL)
                    .unwrap_or_default()
                    .to_vec(),
                contracts::SECRET_WRITE => {
                    instruction.arg(crate::spawner::ARG_WRITE).unwrap_or_default().to_vec()
                }
                _ => instruction.arg(crate::spawner::ARG_READ).unwrap_or_default().to_vec(),
            };
            state.instances.insert(
                instance,
                StoredInstance {
                    value,
                    governing,
                    balance,
                },
            );
            Ok(())
        }
        InstructionKind::Invoke { contract, command, .. }
            if contract == contracts::DARC
                && (command == commands::EVOLVE || command == commands::EVOLVE_UNRESTRICTED) =>
        {
            let base = DarcId::new(*instruction.target.as_bytes());
            let rule = if command == commands::EVOLVE_UNRESTRICTED {
                RULE_EVOLVE_UNRESTRICTED
            } else {
                RULE_EVOLVE
            };
            check_rule(&state.darcs, base, rule, &signers, index)?;

            let bytes = instruction
                .arg(ARG_DARC)
                .ok_or_else(|| format!("instruction {index}: missing darc argument"))?;
            let candidate = Darc::from_bytes(bytes)
                .map_err(|e| format!("instruction {index}: undecodable darc: {e}"))?;
            let current = &state.darcs[&base];
            if candidate.base_id() != base {
                return Err(format!(
                    "instruction {index}: evolution changes base id of darc {base}"
                ));
            }
            if candidate.version() != current.version() + 1 {
                return Err(format!(
                    "instruction {index}: stale darc version {} (current {})",
                    candidate.version(),
                    current.version()
                ));
            }
            if let Some(stored) = state.instances.get_mut(&instruction.target) {
                stored.value = bytes.to_vec();
            }
            state.darcs.insert(base, candidate);
            Ok(())
        }
        InstructionKind::Invoke { contract, command, .. } => {
            let stored = state
                .instances
                .get(&instruction.target)
                .ok_or_else(|| format!("instruction {index}: unknown instance {}", instruction.target))?
                .clone();
            if let Some(governing) = stored.governing {
                check_rule(&state.darcs, governing, RULE_SIGN, &signers, index)?;
            }
            if contract == contracts::COIN && command == commands::FETCH {
                let amount = instruction
                    .arg(ARG_COINS)
                    .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                    .map(u64::from_le_bytes)
                    .ok_or_else(|| format!("instruction {index}: missing coins argument"))?;
                if stored.balance < amount {
                    return Err(format!(
                        "instruction {index}: insufficient funds: {} < {amount}",
                        stored.balance
                    ));
                }
                if let Some(live) = state.instances.get_mut(&instruction.target) {
                    live.balance -= amount;
                    live.value = live.balance.to_le_bytes().to_vec();
                }
            }
            Ok(())
        }
        InstructionKind::Delete { .. } => {
            let stored = state
                .instances
                .get(&instruction.target)
                .ok_or_else(|| format!("instruction {index}: unknown instance {}", instruction.target))?;
            if let Some(governing) = stored.governing {
                check_rule(&state.darcs, governing, RULE_SIGN, &signers, index)?;
            }
            state.instances.remove(&instruction.target);
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn submit(&self, tx: ClientTransaction, wait_blocks: u32) -> Result<TransactionAck> {
        let mut state = self.lock();
        if state.force_timeout && wait_blocks > 0 {
            return Err(LedgerError::Timeout {
                blocks: wait_blocks,
            });
        }

        // Instructions execute in order against a working copy; any
        // failure discards the whole copy, so no partial effects leak.
        let mut working = state.clone();

        // Darcs spawned anywhere in this atomic unit already resolve for
        // delegation: the set commits together, so a darc spawned at
        // position 3 exists, conceptually, for the rule check at
        // position 0. This is what lets a provisioning transaction spawn
        // a delegation chain in one unit.
        for instruction in tx.instructions() {
            if let InstructionKind::Spawn { contract, .. } = &instruction.kind {
                if contract == contracts::DARC {
                    if let Some(darc) = instruction.arg(ARG_DARC).and_then(|b| Darc::from_bytes(b).ok())
                    {
                        working.darcs.insert(darc.base_id(), darc);
                    }
                }
            }
        }

        for index in 0..tx.instructions().len() {
            if let Err(reason) = apply_instruction(&mut working, &tx, index) {
                debug!(reason, "stub ledger rejecting transaction");
                return Err(LedgerError::submission(reason));
            }
        }

        working.block_index += 1;
        working.accepted.push(tx.clone());
        let block_index = working.block_index;
        *state = working;

        Ok(TransactionAck {
            tx_hash: tx.hash(),
            block_index: (wait_blocks > 0).then_some(block_index),
        })
    }

    async fn spawner(&self, id: InstanceId) -> Result<SpawnerHandle> {
        let state = self.lock();
        if state.spawner.id == id {
            Ok(state.spawner.clone())
        } else {
            Err(LedgerError::not_found(format!("no spawner at {id}")))
        }
    }

    async fn resolve_proof(&self, id: InstanceId) -> Result<MembershipProof> {
        let state = self.lock();
        state
            .instances
            .get(&id)
            .map(|stored| MembershipProof {
                instance: id,
                block_index: state.block_index,
                value: stored.value.clone(),
            })
            .ok_or_else(|| LedgerError::not_found(format!("no instance {id}")))
    }
}
