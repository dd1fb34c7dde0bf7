//! Fee accounting and the credential-transaction assembly
//!
//! New objects are created through a spawner authority that charges per
//! spawn according to its fee schedule. [`CredentialTransaction`] wraps a
//! [`TransactionBuilder`] and keeps the running fee total as operations
//! are appended; [`send_coins`](CredentialTransaction::send_coins)
//! settles the total by prepending a coin `fetch` from the designated
//! funding coin, so the spend and everything it pays for commit in one
//! atomic unit.

use crate::builder::TransactionBuilder;
use crate::client::{LedgerClient, TransactionAck};
use crate::errors::{LedgerError, Result};
use crate::instruction::{commands, contracts, Argument, ClientTransaction, InstanceId, Instruction};
use crate::user::UserSkeleton;
use cairn_core::hash;
use cairn_core::{Darc, DarcId, Identity, KeyPair, RuleExpression};
use crate::credential::{CredentialStruct, ATTR_SEED_PUB, GROUP_PUBLIC};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Spawn argument: serialized darc
pub const ARG_DARC: &str = "darc";
/// Spawn argument: coin type
pub const ARG_COIN_TYPE: &str = "type";
/// Spawn argument: governing darc base id
pub const ARG_DARC_ID: &str = "darcID";
/// Spawn argument: coin instance seed
pub const ARG_COIN_ID: &str = "coinID";
/// Spawn argument: initial coin balance (u64, little endian)
pub const ARG_COIN_VALUE: &str = "coinValue";
/// Spawn argument: credential instance seed
pub const ARG_CRED_ID: &str = "credID";
/// Spawn argument: serialized credential
pub const ARG_CREDENTIAL: &str = "credential";
/// Invoke argument: amount fetched or transferred (u64, little endian)
pub const ARG_COINS: &str = "coins";
/// Spawn argument: serialized write request
pub const ARG_WRITE: &str = "write";
/// Spawn argument: serialized read request
pub const ARG_READ: &str = "read";
/// Spawn argument: pre-image seeding the spawned instance id
pub const ARG_PRE_ID: &str = "preID";

/// A coin denomination, identified by a 32-byte derived tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoinType([u8; 32]);

impl CoinType {
    /// Derive a coin type from its registered name
    pub fn derived(name: &[u8]) -> Self {
        let mut h = hash::hasher();
        h.update(b"coin-type");
        h.update(name);
        Self(*h.finalize().as_bytes())
    }

    /// The ledger's designated native fungible unit
    ///
    /// Only this type may be minted with a non-zero initial balance at
    /// spawn time; every fee is denominated in it.
    pub fn native() -> Self {
        Self::derived(b"cairn")
    }

    /// The raw tag bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Per-operation prices charged by a spawner authority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Price of spawning a darc
    pub cost_darc: u64,
    /// Price of spawning a coin account
    pub cost_coin: u64,
    /// Price of spawning a credential
    pub cost_credential: u64,
    /// Price of spawning a secret-write object
    pub cost_secret_write: u64,
    /// Price of spawning a secret-read request
    pub cost_secret_read: u64,
}

/// A spawner authority and its current fee schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerHandle {
    /// Instance id of the spawner object
    pub id: InstanceId,
    /// The read-only price list in effect
    pub costs: FeeSchedule,
}

/// The coin account fees are drawn from, with its authorized signers
#[derive(Clone)]
pub struct FundingCoin {
    /// Instance id of the funding coin
    pub instance: InstanceId,
    /// Signers satisfying the coin darc's sign rule
    pub signers: Vec<KeyPair>,
}

impl std::fmt::Debug for FundingCoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundingCoin")
            .field("instance", &self.instance.to_string())
            .field("signers", &self.signers.len())
            .finish()
    }
}

/// Local handle for a coin account spawned in this transaction
///
/// The instance id is derived from the spawn seed, so it is known before
/// the transaction is confirmed — or even submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinHandle {
    /// Where the coin will live once the transaction commits
    pub instance: InstanceId,
    /// Base id of the governing darc
    pub darc_id: DarcId,
    /// Denomination
    pub coin_type: CoinType,
    /// Balance minted at spawn
    pub value: u64,
}

/// Transaction wrapper that tracks spawner fees as operations accumulate
pub struct CredentialTransaction {
    tx: TransactionBuilder,
    spawner: SpawnerHandle,
    coin: FundingCoin,
    cost: u64,
}

impl CredentialTransaction {
    /// A fee-tracking transaction drawing funds from `coin`
    pub fn new(client: Arc<dyn LedgerClient>, spawner: SpawnerHandle, coin: FundingCoin) -> Self {
        Self {
            tx: TransactionBuilder::new(client),
            spawner,
            coin,
            cost: 0,
        }
    }

    /// An independent empty transaction with the fee total reset
    ///
    /// Shares only immutable context: the ledger handle, the spawner and
    /// the funding coin.
    pub fn clone_fresh(&self) -> Self {
        Self {
            tx: self.tx.clone_fresh(),
            spawner: self.spawner.clone(),
            coin: self.coin.clone(),
            cost: 0,
        }
    }

    /// The running fee total owed to the spawner
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// The underlying builder, for operations with no fee attached
    pub fn builder(&mut self) -> &mut TransactionBuilder {
        &mut self.tx
    }

    /// The accumulated instructions, in execution order
    pub fn instructions(&self) -> &[Instruction] {
        self.tx.instructions()
    }

    /// Append a darc spawn and charge `cost_darc`
    pub fn spawn_darc(&mut self, darc: Darc) -> Result<Darc> {
        let bytes = darc.to_bytes()?;
        self.tx.spawn(
            self.spawner.id,
            contracts::DARC,
            vec![Argument::new(ARG_DARC, bytes)],
        );
        self.cost += self.spawner.costs.cost_darc;
        Ok(darc)
    }

    /// Spawn a darc where `signers` may both sign and evolve
    pub fn spawn_darc_basic(&mut self, description: &str, signers: &[Identity]) -> Result<Darc> {
        self.spawn_darc(Darc::basic(signers, signers, description))
    }

    /// Append a coin spawn and charge `cost_coin` plus the minted balance
    ///
    /// The coin instance lives at an id derived from `coin_id` (the
    /// governing darc's id when not given). Seeding a non-native coin
    /// type with a non-zero balance is a client-side invariant violation
    /// and fails locally with [`LedgerError::InvalidMint`] — it never
    /// reaches the ledger.
    pub fn spawn_coin(
        &mut self,
        coin_type: CoinType,
        darc_id: DarcId,
        coin_id: Option<&[u8]>,
        initial: u64,
    ) -> Result<CoinHandle> {
        if initial > 0 && coin_type != CoinType::native() {
            return Err(LedgerError::invalid_mint(format!(
                "initial balance {initial} requires the native coin type"
            )));
        }

        let seed: Vec<u8> = coin_id
            .map(|s| s.to_vec())
            .unwrap_or_else(|| darc_id.as_bytes().to_vec());
        self.tx.spawn(
            self.spawner.id,
            contracts::COIN,
            vec![
                Argument::new(ARG_COIN_TYPE, coin_type.as_bytes().to_vec()),
                Argument::new(ARG_DARC_ID, darc_id.as_bytes().to_vec()),
                Argument::new(ARG_COIN_ID, seed.clone()),
                Argument::new(ARG_COIN_VALUE, initial.to_le_bytes().to_vec()),
            ],
        );
        self.cost += self.spawner.costs.cost_coin + initial;

        Ok(CoinHandle {
            instance: InstanceId::derived(contracts::COIN, &seed),
            darc_id,
            coin_type,
            value: initial,
        })
    }

    /// Append a credential spawn and charge `cost_credential`
    ///
    /// Without an explicit `cred_id`, the instance id is seeded from the
    /// credential's `public/seed-pub` attribute; a credential lacking
    /// that attribute cannot be spawned anonymously.
    pub fn spawn_credential(
        &mut self,
        cred: &CredentialStruct,
        darc_id: DarcId,
        cred_id: Option<Vec<u8>>,
    ) -> Result<InstanceId> {
        let seed = match cred_id {
            Some(seed) => seed,
            None => cred
                .attribute(GROUP_PUBLIC, ATTR_SEED_PUB)
                .map(|v| v.to_vec())
                .ok_or_else(|| {
                    LedgerError::construction(
                        "no credential id given and no public/seed-pub attribute to derive one",
                    )
                })?,
        };
        self.tx.spawn(
            self.spawner.id,
            contracts::CREDENTIAL,
            vec![
                Argument::new(ARG_CRED_ID, seed.clone()),
                Argument::new(ARG_DARC_ID, darc_id.as_bytes().to_vec()),
                Argument::new(ARG_CREDENTIAL, cred.to_bytes()?),
            ],
        );
        self.cost += self.spawner.costs.cost_credential;
        Ok(InstanceId::derived(contracts::CREDENTIAL, &seed))
    }

    /// Append a secret-write spawn and charge `cost_secret_write`
    ///
    /// The write payload is opaque here; the re-encryption scheme behind
    /// it is an external collaborator.
    pub fn spawn_secret_write(
        &mut self,
        darc_id: DarcId,
        write: Vec<u8>,
        pre_id: Option<[u8; 32]>,
    ) -> InstanceId {
        let pre_id = pre_id.unwrap_or_else(rand::random);
        self.tx.spawn(
            self.spawner.id,
            contracts::SECRET_WRITE,
            vec![
                Argument::new(ARG_WRITE, write),
                Argument::new(ARG_DARC_ID, darc_id.as_bytes().to_vec()),
                Argument::new(ARG_PRE_ID, pre_id.to_vec()),
            ],
        );
        self.cost += self.spawner.costs.cost_secret_write;
        InstanceId::derived(contracts::SECRET_WRITE, &pre_id)
    }

    /// Append a secret-read spawn against an existing write object and
    /// charge `cost_secret_read`
    pub fn spawn_secret_read(
        &mut self,
        write_id: InstanceId,
        reader: &Identity,
        pre_id: Option<[u8; 32]>,
    ) -> InstanceId {
        let pre_id = pre_id.unwrap_or_else(rand::random);
        let mut read = write_id.as_bytes().to_vec();
        read.extend_from_slice(reader.to_string().as_bytes());
        self.tx.spawn(
            write_id,
            contracts::SECRET_READ,
            vec![
                Argument::new(ARG_READ, read),
                Argument::new(ARG_PRE_ID, pre_id.to_vec()),
            ],
        );
        self.cost += self.spawner.costs.cost_secret_read;
        InstanceId::derived(contracts::SECRET_READ, &pre_id)
    }

    /// Evolve `darc` with additional rules and append the authorized
    /// invoke instruction; returns the candidate document
    pub fn evolve_darc_add_rules(
        &mut self,
        darc: &Darc,
        rules: &[(String, RuleExpression)],
    ) -> Result<Darc> {
        let mut new_rules = darc.rules().clone();
        for (action, expr) in rules {
            new_rules.set_rule(action.clone(), expr.clone());
        }
        let candidate = darc.evolve(cairn_core::DarcUpdate {
            rules: Some(new_rules),
            description: None,
        });
        self.tx.invoke(
            darc.base_id().into(),
            contracts::DARC,
            commands::EVOLVE,
            vec![Argument::new(ARG_DARC, candidate.to_bytes()?)],
        );
        Ok(candidate)
    }

    /// Append the full provisioning sequence for a new user
    ///
    /// Exactly six instructions, in fixed order: the four darcs (sign,
    /// device, credential, coin), the native coin account owned by the
    /// coin darc and funded at `initial`, and the credential owned by the
    /// credential darc. Later spawns name the base ids of earlier ones,
    /// which is why the order is fixed even though all six commit
    /// atomically.
    pub fn create_user(&mut self, user: &UserSkeleton, initial: u64) -> Result<CoinHandle> {
        debug!(alias = user.alias(), "spawning user darcs");
        for darc in [
            user.darc_sign(),
            user.darc_device(),
            user.darc_cred(),
            user.darc_coin(),
        ] {
            self.spawn_darc(darc.clone())?;
        }

        debug!(alias = user.alias(), initial, "spawning user coin");
        let coin = self.spawn_coin(
            CoinType::native(),
            user.darc_coin().base_id(),
            Some(&user.coin_seed()),
            initial,
        )?;

        debug!(
            alias = user.alias(),
            darc = %user.darc_cred().base_id(),
            "spawning user credential"
        );
        self.spawn_credential(user.credential(), user.darc_cred().base_id(), None)?;
        Ok(coin)
    }

    /// Settle the fee total and submit everything atomically
    ///
    /// When fees were accumulated, a coin `fetch` for the exact total is
    /// prepended so every later instruction in the unit is funded, then
    /// the whole sequence is signed by the funding coin's signers and
    /// submitted. Consumes the transaction; a new attempt starts from
    /// [`clone_fresh`](CredentialTransaction::clone_fresh).
    pub async fn send_coins(
        mut self,
        wait_blocks: u32,
    ) -> Result<(ClientTransaction, TransactionAck)> {
        if self.cost > 0 {
            debug!(cost = self.cost, "prepending fee fetch");
            self.tx.unshift(Instruction::invoke(
                self.coin.instance,
                contracts::COIN,
                commands::FETCH,
                vec![Argument::new(ARG_COINS, self.cost.to_le_bytes().to_vec())],
            ));
        }
        let signers = vec![self.coin.signers.clone()];
        self.tx.send(&signers, wait_blocks).await
    }

    /// Sign with explicit signer sets and submit, bypassing fee settlement
    ///
    /// For transactions that carry no fee-bearing operations (e.g. pure
    /// darc evolutions signed by the evolving parties).
    pub async fn send(
        self,
        signer_sets: &[Vec<KeyPair>],
        wait_blocks: u32,
    ) -> Result<(ClientTransaction, TransactionAck)> {
        self.tx.send(signer_sets, wait_blocks).await
    }
}

impl std::fmt::Debug for CredentialTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialTransaction")
            .field("instructions", &self.tx.instructions().len())
            .field("cost", &self.cost)
            .finish()
    }
}
