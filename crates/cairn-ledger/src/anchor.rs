//! Local trust-anchor cache for the chain-sync collaborator
//!
//! The chain-sync process keeps a "latest trusted block" so it can catch
//! up from a recent point instead of the genesis block. This layer
//! neither fetches nor verifies blocks — it only offers the durable
//! read/write pair the sync process stores its anchor through.

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Minimal view of a ledger block used as a trust anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height of the block
    pub index: u64,
    /// Hash of the block
    pub hash: [u8; 32],
}

/// Durable storage for the latest trusted block
pub trait TrustAnchorStore: Send + Sync {
    /// The stored anchor, if any
    fn load_latest(&self) -> Result<Option<Block>>;

    /// Replace the stored anchor
    fn store_latest(&self, block: &Block) -> Result<()>;
}

/// In-memory anchor store for tests and ephemeral clients
#[derive(Debug, Default)]
pub struct MemoryAnchorStore {
    latest: RwLock<Option<Block>>,
}

impl MemoryAnchorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrustAnchorStore for MemoryAnchorStore {
    fn load_latest(&self) -> Result<Option<Block>> {
        Ok(*self.latest.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn store_latest(&self, block: &Block) -> Result<()> {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(*block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips() {
        let store = MemoryAnchorStore::new();
        assert_eq!(store.load_latest().unwrap(), None);

        let block = Block {
            index: 42,
            hash: [7; 32],
        };
        store.store_latest(&block).unwrap();
        assert_eq!(store.load_latest().unwrap(), Some(block));
    }
}
