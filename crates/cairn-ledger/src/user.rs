//! User provisioning skeleton
//!
//! A new user is four access-control documents, one coin account and one
//! credential object, all spawned in a single atomic transaction. The
//! darcs form a delegation chain: the device darc is signed by the
//! device key directly; the sign darc delegates to the device darc (so a
//! device can be rotated without touching anything downstream); and the
//! credential and coin darcs delegate to the sign darc.

use crate::credential::{CredentialStruct, ATTR_ALIAS, ATTR_SEED_PUB, GROUP_PUBLIC};
use cairn_core::{Darc, Identity, KeyPair};

/// Everything needed to provision a new user on the ledger
#[derive(Debug, Clone)]
pub struct UserSkeleton {
    keypair: KeyPair,
    alias: String,
    darc_sign: Darc,
    darc_device: Darc,
    darc_cred: Darc,
    darc_coin: Darc,
    cred: CredentialStruct,
}

impl UserSkeleton {
    /// Skeleton for `alias` with a freshly generated device key
    pub fn new(alias: impl Into<String>) -> Self {
        Self::with_keypair(alias, KeyPair::random())
    }

    /// Skeleton for `alias` using an existing device key
    pub fn with_keypair(alias: impl Into<String>, keypair: KeyPair) -> Self {
        let alias = alias.into();
        let device_identity = keypair.identity();

        let darc_device = Darc::basic(
            &[device_identity],
            &[device_identity],
            format!("device:initial:{alias}"),
        );
        let device_ref = Identity::darc(darc_device.base_id());

        let darc_sign = Darc::basic(&[device_ref], &[device_ref], format!("signer:{alias}"));
        let sign_ref = Identity::darc(darc_sign.base_id());

        let darc_cred = Darc::basic(&[sign_ref], &[sign_ref], format!("credential:{alias}"));
        let darc_coin = Darc::basic(&[sign_ref], &[sign_ref], format!("coin:{alias}"));

        let mut cred = CredentialStruct::new();
        cred.set_attribute(GROUP_PUBLIC, ATTR_ALIAS, alias.clone().into_bytes());
        cred.set_attribute(
            GROUP_PUBLIC,
            ATTR_SEED_PUB,
            keypair.verifying_key().to_bytes().to_vec(),
        );

        Self {
            keypair,
            alias,
            darc_sign,
            darc_device,
            darc_cred,
            darc_coin,
            cred,
        }
    }

    /// The device keypair
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// The user's display alias
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Darc authorizing actions on behalf of the user
    pub fn darc_sign(&self) -> &Darc {
        &self.darc_sign
    }

    /// Darc holding the device key
    pub fn darc_device(&self) -> &Darc {
        &self.darc_device
    }

    /// Darc owning the credential object
    pub fn darc_cred(&self) -> &Darc {
        &self.darc_cred
    }

    /// Darc owning the coin account
    pub fn darc_coin(&self) -> &Darc {
        &self.darc_coin
    }

    /// The initial credential contents
    pub fn credential(&self) -> &CredentialStruct {
        &self.cred
    }

    /// Seed for the user's coin instance id: the device public key
    pub fn coin_seed(&self) -> [u8; 32] {
        self.keypair.verifying_key().to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{RULE_EVOLVE, RULE_SIGN};

    #[test]
    fn delegation_chain_is_wired() {
        let user = UserSkeleton::with_keypair("ada", KeyPair::from_seed([1; 32]));

        let device_ref = Identity::darc(user.darc_device().base_id());
        let sign_ref = Identity::darc(user.darc_sign().base_id());

        // Device key signs the device darc directly.
        assert!(user
            .darc_device()
            .rules()
            .expression(RULE_SIGN)
            .matches(&[user.keypair().identity()])
            .unwrap());
        // Sign darc delegates to the device darc.
        assert!(user
            .darc_sign()
            .rules()
            .expression(RULE_SIGN)
            .matches(&[device_ref])
            .unwrap());
        // Credential and coin darcs delegate to the sign darc.
        for darc in [user.darc_cred(), user.darc_coin()] {
            assert!(darc.rules().expression(RULE_SIGN).matches(&[sign_ref]).unwrap());
            assert!(darc
                .rules()
                .expression(RULE_EVOLVE)
                .matches(&[sign_ref])
                .unwrap());
        }
    }

    #[test]
    fn credential_carries_alias_and_seed() {
        let user = UserSkeleton::with_keypair("ada", KeyPair::from_seed([1; 32]));
        assert_eq!(
            user.credential().attribute(GROUP_PUBLIC, ATTR_ALIAS),
            Some(&b"ada"[..])
        );
        assert_eq!(
            user.credential().attribute(GROUP_PUBLIC, ATTR_SEED_PUB),
            Some(user.coin_seed().as_slice())
        );
    }
}
