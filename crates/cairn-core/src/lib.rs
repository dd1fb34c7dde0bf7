//! Cairn Core - Identities, Rules and Access-Control Documents
//!
//! This crate provides the pure data layer of the Cairn client: identity
//! atoms, the boolean rule algebra combining them, and the versioned
//! access-control documents (darcs) that gate every ledger object. There
//! is no I/O here — everything is an in-memory value transform, which is
//! what lets the transaction layer build candidate documents and rules
//! before anything touches the network.

#![forbid(unsafe_code)]

/// Content hashing for 32-byte object identifiers
pub mod hash;

/// Identity atoms and signing keys
pub mod identity;

/// Boolean rule expressions over identities
pub mod expression;

/// Versioned access-control documents
pub mod darc;

/// Unified error handling
pub mod errors;

pub use darc::{Darc, DarcId, DarcUpdate, Rules, RULE_EVOLVE, RULE_EVOLVE_UNRESTRICTED, RULE_SIGN};
pub use errors::{CoreError, Result};
pub use expression::{Combinator, RuleExpression};
pub use identity::{Identity, IdentitySignature, KeyPair, SCHEME_DARC, SCHEME_ED25519};
