//! Address derivation (C1).
//!
//! An address is an opaque identifier derived from a public key:
//! `"bt2c_" || lowercase(base32(truncate(sha256(pubkey), 16)))` with base32
//! padding stripped. Addresses are stable for the lifetime of a key, and
//! because they are a function of the public key (not of any particular
//! signature scheme metadata), a key rotation that preserves the underlying
//! seed also preserves the address.

use std::collections::HashMap;

use ed25519_dalek::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The coinbase/system sentinel: sender of genesis and block-reward
/// transactions. Has no backing key; signatures from this address are
/// accepted unconditionally at consensus boundaries.
pub const COINBASE_SENTINEL: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// An opaque account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Derives the address for a public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = Sha256::digest(public_key.as_bytes());
        let truncated = &digest[..16];
        let encoded = base32::encode(base32::Alphabet::RFC4648 { padding: false }, truncated);
        Address(format!("bt2c_{}", encoded.to_lowercase()))
    }

    /// The coinbase sentinel address.
    pub fn coinbase() -> Self {
        Address(COINBASE_SENTINEL.to_string())
    }

    pub fn is_coinbase(&self) -> bool {
        self.0 == COINBASE_SENTINEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Maps addresses to the public key that derives them, so a verifier that
/// only has an `Address` on a transaction can still check its signature.
/// Populated whenever a node first observes a transaction or block
/// signature accompanied by the signer's public key (wallet submission,
/// validator registration); never grown from unauthenticated data alone.
#[derive(Debug, Default, Clone)]
pub struct AddressBook {
    keys: HashMap<Address, PublicKey>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public key under its derived address, returning that
    /// address.
    pub fn register(&mut self, public_key: PublicKey) -> Address {
        let address = Address::from_public_key(&public_key);
        self.keys.insert(address.clone(), public_key);
        address
    }

    pub fn resolve(&self, address: &Address) -> Option<PublicKey> {
        self.keys.get(address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn address_is_deterministic_in_seed() {
        let a = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let b = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(
            Address::from_public_key(&a.public_key()),
            Address::from_public_key(&b.public_key())
        );
    }

    #[test]
    fn address_has_expected_prefix() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let addr = Address::from_public_key(&kp.public_key());
        assert!(addr.as_str().starts_with("bt2c_"));
    }

    #[test]
    fn coinbase_sentinel_is_recognized() {
        assert!(Address::coinbase().is_coinbase());
        let real: Address = "bt2c_abcdefgh".into();
        assert!(!real.is_coinbase());
    }
}
