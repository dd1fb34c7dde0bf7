//! Error taxonomy for transaction assembly and submission
//!
//! Three families matter to callers: construction errors are detected
//! locally and never reach the ledger; submission errors carry the
//! ledger's rejection reason verbatim and are never retried here; a
//! timeout is a distinct outcome from a rejection — the transaction may
//! still be included, so callers should re-query the proof before
//! resubmitting.

use cairn_core::CoreError;

/// Error type for ledger-facing operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// The transaction could not be built; nothing was sent
    #[error("Construction error: {message}")]
    Construction {
        /// What was wrong with the builder input
        message: String,
    },

    /// A non-native coin type was seeded with an initial balance
    #[error("Invalid mint: {message}")]
    InvalidMint {
        /// Which coin type and balance were attempted
        message: String,
    },

    /// The ledger rejected the transaction
    #[error("Submission rejected: {reason}")]
    Submission {
        /// The ledger's rejection reason, verbatim
        reason: String,
    },

    /// Confirmation was not observed within the bounded wait
    #[error("Timed out after {blocks} block round(s)")]
    Timeout {
        /// How many rounds were waited
        blocks: u32,
    },

    /// An object or proof was not found on the ledger
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up
        message: String,
    },

    /// The local trust-anchor store failed
    #[error("Storage error: {message}")]
    Storage {
        /// The underlying store message
        message: String,
    },

    /// Canonical encoding or decoding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// The underlying encoder message
        message: String,
    },
}

impl LedgerError {
    /// Create a construction error
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction {
            message: message.into(),
        }
    }

    /// Create an invalid mint error
    pub fn invalid_mint(message: impl Into<String>) -> Self {
        Self::InvalidMint {
            message: message.into(),
        }
    }

    /// Create a submission error carrying the ledger's reason
    pub fn submission(reason: impl Into<String>) -> Self {
        Self::Submission {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        // Rule and identity problems surface while building, before any
        // network traffic, so they are construction failures here.
        match err {
            CoreError::Serialization { message } => Self::Serialization { message },
            other => Self::Construction {
                message: other.to_string(),
            },
        }
    }
}

/// Standard Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
