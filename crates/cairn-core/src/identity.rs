//! Identity atoms and signing keys
//!
//! An [`Identity`] is the atomic "who" of an authorization rule: either a
//! raw Ed25519 public key, or a reference to another access-control
//! document by its base id (delegation). Identities have a canonical text
//! form — `ed25519:<hex>` or `darc:<hex>` — and equality is defined over
//! that canonical encoding.

use crate::darc::DarcId;
use crate::errors::{CoreError, Result};
use ed25519_dalek::{Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheme prefix for public-key identities
pub const SCHEME_ED25519: &str = "ed25519";

/// Scheme prefix for darc-reference identities
pub const SCHEME_DARC: &str = "darc";

/// One atom of an authorization rule
///
/// Either a public key that can directly produce signatures, or a
/// reference to another darc whose `_sign` rule stands in for this
/// identity (resolved by the ledger, not by this crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identity {
    /// A raw Ed25519 public key (32 bytes)
    Ed25519([u8; 32]),
    /// A reference to another darc by base id
    Darc(DarcId),
}

impl Identity {
    /// Identity for an Ed25519 verifying key
    pub fn ed25519(key: &VerifyingKey) -> Self {
        Self::Ed25519(key.to_bytes())
    }

    /// Identity referencing a darc by base id
    pub fn darc(id: DarcId) -> Self {
        Self::Darc(id)
    }

    /// Verify a signature produced by this identity over `message`
    ///
    /// Darc references cannot be verified directly — resolving them
    /// requires the referenced darc's `_sign` rule, which only the ledger
    /// (or a test stub holding a darc registry) can do.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        match self {
            Self::Ed25519(bytes) => {
                let key = VerifyingKey::from_bytes(bytes)
                    .map_err(|e| CoreError::invalid_identity(format!("bad public key: {e}")))?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| CoreError::invalid_identity(format!("bad signature: {e}")))?;
                Ok(key.verify(message, &sig).is_ok())
            }
            Self::Darc(id) => Err(CoreError::invalid_identity(format!(
                "darc identity {id} cannot verify signatures directly"
            ))),
        }
    }
}

impl From<DarcId> for Identity {
    fn from(id: DarcId) -> Self {
        Self::Darc(id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519(bytes) => write!(f, "{}:{}", SCHEME_ED25519, hex::encode(bytes)),
            Self::Darc(id) => write!(f, "{}:{}", SCHEME_DARC, hex::encode(id.as_bytes())),
        }
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (scheme, body) = s
            .split_once(':')
            .ok_or_else(|| CoreError::invalid_identity(format!("missing scheme in '{s}'")))?;
        let bytes = hex::decode(body)
            .map_err(|e| CoreError::invalid_identity(format!("bad hex in '{s}': {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_identity(format!("identity in '{s}' is not 32 bytes")))?;
        match scheme {
            SCHEME_ED25519 => Ok(Self::Ed25519(bytes)),
            SCHEME_DARC => Ok(Self::Darc(DarcId::new(bytes))),
            other => Err(CoreError::invalid_identity(format!(
                "unknown identity scheme '{other}'"
            ))),
        }
    }
}

/// A signature together with the identity that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySignature {
    /// Who signed
    pub signer: Identity,
    /// The raw signature bytes
    pub signature: Vec<u8>,
}

impl IdentitySignature {
    /// Verify this signature over `message`
    pub fn verify(&self, message: &[u8]) -> Result<bool> {
        self.signer.verify(message, &self.signature)
    }
}

/// An Ed25519 keypair able to authorize instructions
///
/// Cloneable so funding-coin handles can share their signer set with
/// independent transaction builders.
#[derive(Clone)]
pub struct KeyPair {
    key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from OS randomness
    pub fn random() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            key: SigningKey::generate(&mut rng),
        }
    }

    /// Deterministic keypair from a 32-byte seed (tests, device recovery)
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// The public identity of this keypair
    pub fn identity(&self) -> Identity {
        Identity::ed25519(&self.key.verifying_key())
    }

    /// The verifying key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign `message`, returning the signature tagged with our identity
    pub fn sign(&self, message: &[u8]) -> IdentitySignature {
        IdentitySignature {
            signer: self.identity(),
            signature: self.key.sign(message).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret half.
        f.debug_struct("KeyPair")
            .field("identity", &self.identity().to_string())
            .finish()
    }
}
