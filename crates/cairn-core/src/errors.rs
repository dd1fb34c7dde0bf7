//! Error type for core operations
//!
//! Everything in this crate is a pure data transform, so the error surface
//! is small: a rule expression that does not parse, an identity string with
//! an unknown scheme, or a canonical encoding that failed.

use serde::{Deserialize, Serialize};

/// Error type for identity, rule and darc operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum CoreError {
    /// A rule expression could not be parsed
    #[error("Rule parse error: {message}")]
    RuleParse {
        /// What was malformed and where
        message: String,
    },

    /// An identity string or key was malformed
    #[error("Invalid identity: {message}")]
    InvalidIdentity {
        /// What was wrong with the identity
        message: String,
    },

    /// Canonical serialization failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// The underlying encoder message
        message: String,
    },
}

impl CoreError {
    /// Create a rule parse error
    pub fn rule_parse(message: impl Into<String>) -> Self {
        Self::RuleParse {
            message: message.into(),
        }
    }

    /// Create an invalid identity error
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
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

/// Standard Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
