//! The ledger-client collaborator interface
//!
//! Consensus, transport and block verification live behind
//! [`LedgerClient`]; this crate only assembles transactions and hands
//! them over. Implementations are expected to bound their own waiting:
//! `wait_blocks` is the maximum number of ledger rounds to watch for
//! inclusion, and expiry of that bound is reported as
//! [`LedgerError::Timeout`] — a distinct outcome from rejection, since
//! the transaction may still commit later.

use crate::errors::Result;
use crate::instruction::{ClientTransaction, InstanceId};
use crate::spawner::SpawnerHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgment of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAck {
    /// Hash of the submitted transaction
    pub tx_hash: [u8; 32],
    /// Block the transaction was included in, when inclusion was awaited
    pub block_index: Option<u64>,
}

/// Inclusion evidence for the current version of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    /// The proven instance
    pub instance: InstanceId,
    /// Block index the proof was taken at
    pub block_index: u64,
    /// The object's current serialized value
    pub value: Vec<u8>,
}

/// Interface to the replicated ledger
///
/// [`LedgerError::Submission`]: crate::errors::LedgerError::Submission
/// [`LedgerError::Timeout`]: crate::errors::LedgerError::Timeout
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit `tx` atomically, waiting up to `wait_blocks` rounds for
    /// inclusion (0 = acknowledgment only)
    ///
    /// Rejections surface as [`LedgerError::Submission`] with the
    /// ledger's reason verbatim; this layer never retries.
    async fn submit(&self, tx: ClientTransaction, wait_blocks: u32) -> Result<TransactionAck>;

    /// The spawner authority at `id`, with its current fee schedule
    async fn spawner(&self, id: InstanceId) -> Result<SpawnerHandle>;

    /// Membership proof for the current version of `id`
    async fn resolve_proof(&self, id: InstanceId) -> Result<MembershipProof>;
}
