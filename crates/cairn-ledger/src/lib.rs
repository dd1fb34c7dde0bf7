//! Cairn Ledger - Transaction Assembly for a Darc-Guarded Ledger
//!
//! This crate builds atomic instruction sets against a Byzantine
//! fault-tolerant ledger whose objects are guarded by versioned
//! access-control documents. It stays pure and in-memory right up to
//! submission: builders accumulate spawn/invoke/delete instructions and
//! a running fee total, darc cells republish the latest authorized
//! state to dependents, and only `send` touches the network through the
//! [`LedgerClient`] collaborator.
//!
//! Consensus, transport, chain catch-up and block verification live
//! behind the [`client`] and [`anchor`] interfaces and are not
//! implemented here.

#![forbid(unsafe_code)]

/// Instructions and client transactions
pub mod instruction;

/// The ledger-client collaborator interface
pub mod client;

/// Local trust-anchor cache for chain sync
pub mod anchor;

/// Accumulating transaction builder
pub mod builder;

/// Reactive darc cells
pub mod cells;

/// Fee accounting and the credential-transaction assembly
pub mod spawner;

/// Credential objects
pub mod credential;

/// User provisioning skeleton
pub mod user;

/// Unified error handling
pub mod errors;

/// In-process ledger stub for tests
pub mod testing;

pub use anchor::{Block, MemoryAnchorStore, TrustAnchorStore};
pub use builder::TransactionBuilder;
pub use cells::{DarcCell, DarcsCell};
pub use client::{LedgerClient, MembershipProof, TransactionAck};
pub use credential::CredentialStruct;
pub use errors::{LedgerError, Result};
pub use instruction::{
    commands, contracts, Argument, ClientTransaction, InstanceId, Instruction, InstructionKind,
};
pub use spawner::{
    CoinHandle, CoinType, CredentialTransaction, FeeSchedule, FundingCoin, SpawnerHandle,
};
pub use user::UserSkeleton;
