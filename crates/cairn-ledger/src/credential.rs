//! Credential objects
//!
//! A credential is the ledger object holding a user's attribute set:
//! named groups of named byte values. The contents are opaque to this
//! layer except for one attribute — `public/seed-pub` — which seeds the
//! deterministic credential instance id when no explicit id is given at
//! spawn time.

use crate::errors::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute group holding publicly visible attributes
pub const GROUP_PUBLIC: &str = "public";

/// Public attribute seeding the credential instance id
pub const ATTR_SEED_PUB: &str = "seed-pub";

/// Public attribute carrying the user's display alias
pub const ATTR_ALIAS: &str = "alias";

/// A user's attribute set, grouped by credential name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStruct {
    credentials: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl CredentialStruct {
    /// An empty attribute set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one attribute, creating its group as needed
    pub fn set_attribute(
        &mut self,
        group: impl Into<String>,
        name: impl Into<String>,
        value: Vec<u8>,
    ) {
        self.credentials
            .entry(group.into())
            .or_default()
            .insert(name.into(), value);
    }

    /// Look up one attribute
    pub fn attribute(&self, group: &str, name: &str) -> Option<&[u8]> {
        self.credentials
            .get(group)
            .and_then(|attrs| attrs.get(name))
            .map(|v| v.as_slice())
    }

    /// Iterate over groups in name order
    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Vec<u8>>)> {
        self.credentials.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical byte encoding, used as the spawn argument payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LedgerError::serialization(e.to_string()))
    }

    /// Decode from the canonical byte encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| LedgerError::serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_grouped() {
        let mut cred = CredentialStruct::new();
        cred.set_attribute(GROUP_PUBLIC, ATTR_ALIAS, b"ada".to_vec());
        cred.set_attribute(GROUP_PUBLIC, ATTR_SEED_PUB, vec![1, 2, 3]);
        cred.set_attribute("devices", "laptop", vec![9]);

        assert_eq!(cred.attribute(GROUP_PUBLIC, ATTR_ALIAS), Some(&b"ada"[..]));
        assert_eq!(cred.attribute("devices", "laptop"), Some(&[9u8][..]));
        assert_eq!(cred.attribute("devices", "phone"), None);
        assert_eq!(cred.groups().count(), 2);
    }
}
