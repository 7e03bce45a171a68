//! Deterministic key derivation and signing for **BT2C** (C1).
//!
//! The source specification asks for deterministic RSA-2048 key generation
//! from a BIP-39 seed. Deterministic RSA key generation (finding primes
//! reproducibly from a seed) is nontrivial and not what any implementation
//! in the reference corpus does; per the design notes this substitutes
//! Ed25519 with HKDF-SHA512 over the BIP-39 seed, which gives the same
//! reproducibility guarantee (`generate(seed) == generate(seed)`) with a
//! well-trodden signature scheme. The genesis config records which scheme a
//! network uses; within one network the choice is fixed.

use bip39::{Language, Mnemonic};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer};
use hkdf::Hkdf;
use sha2::Sha512;

use crate::error::{Error, Result};

/// A derived signing keypair, deterministic in the mnemonic that produced
/// it.
pub struct KeyPair {
    keypair: Keypair,
}

impl KeyPair {
    /// Generates a keypair deterministically from a BIP-39 mnemonic phrase.
    /// An empty passphrase is used for the BIP-39 seed, matching the
    /// reference implementation's single-factor derivation.
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| Error::InvalidFormat(format!("invalid mnemonic: {e}")))?;
        let seed = mnemonic.to_seed("");
        Self::from_seed(&seed)
    }

    /// Generates a keypair deterministically from a raw BIP-39 seed (as
    /// produced by `Mnemonic::to_seed`), using HKDF-SHA512 to separate the
    /// signing key from other key material derived from the same seed (see
    /// [`derive_keys`]).
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let signing_bytes = hkdf_expand(seed, b"bt2c|signing", 32)?;
        let secret = SecretKey::from_bytes(&signing_bytes)
            .map_err(|_| Error::InvalidFormat("key derivation produced invalid scalar".into()))?;
        let public = PublicKey::from(&secret);
        Ok(Self {
            keypair: Keypair { secret, public },
        })
    }

    /// Imports a keypair from raw 32-byte seed bytes previously produced by
    /// [`from_seed`]/[`from_mnemonic`], e.g. when reloading from an
    /// encrypted wallet file.
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret =
            SecretKey::from_bytes(bytes).map_err(|_| Error::InvalidFormat("key format".into()))?;
        let public = PublicKey::from(&secret);
        Ok(Self {
            keypair: Keypair { secret, public },
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }

    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.keypair.secret.to_bytes()
    }

    /// Signs a pre-hashed message (the transaction/block preimage digest).
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.keypair.sign(message)
    }
}

/// Verifies `signature` over `message` against `public_key`.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify_strict(message, signature).is_ok()
}

/// Derives the three sub-keys a wallet needs (signing, at-rest encryption,
/// authentication) from one BIP-39 seed via HKDF with distinct `info`
/// contexts, so compromising one derived key does not reveal the others or
/// the seed itself.
pub fn derive_keys(seed: &[u8]) -> Result<DerivedKeys> {
    Ok(DerivedKeys {
        signing: hkdf_expand(seed, b"bt2c|signing", 32)?,
        encryption: hkdf_expand(seed, b"bt2c|encryption", 32)?,
        authentication: hkdf_expand(seed, b"bt2c|authentication", 32)?,
    })
}

pub struct DerivedKeys {
    pub signing: [u8; 32],
    pub encryption: [u8; 32],
    pub authentication: [u8; 32],
}

fn hkdf_expand(seed: &[u8], info: &[u8], len: usize) -> Result<[u8; 32]> {
    if len != 32 {
        return Err(Error::Other("only 32-byte HKDF outputs are supported".into()));
    }
    let hk = Hkdf::<Sha512>::new(None, seed);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .map_err(|_| Error::Other("HKDF expansion failed".into()))?;
    Ok(out)
}

/// Generates a fresh random BIP-39 mnemonic (256-bit entropy, English
/// wordlist), for wallet creation rather than restoration.
pub fn generate_mnemonic() -> Mnemonic {
    let mut entropy = [0u8; 32];
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    Mnemonic::from_entropy_in(Language::English, &entropy).expect("32 bytes is valid entropy")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn same_mnemonic_yields_same_keypair() {
        let a = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let b = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());

        let msg = b"bt2c-test-message";
        let sig_a = a.sign(msg);
        let sig_b = b.sign(msg);
        assert_eq!(sig_a.to_bytes(), sig_b.to_bytes());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let msg = b"hello bt2c";
        let sig = kp.sign(msg);
        assert!(verify(&kp.public_key(), msg, &sig));
        assert!(!verify(&kp.public_key(), b"tampered", &sig));
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        assert!(KeyPair::from_mnemonic("not a valid mnemonic phrase at all").is_err());
    }
}
