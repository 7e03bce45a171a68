//! AES-256-GCM at-rest encryption (§4.9). Authenticated, single ciphertext
//! field — the tag rides along inside it rather than a separate field.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::{Error, Result};

pub const NONCE_LEN: usize = 12; // 96-bit IV, per §4.9

pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn encrypt(key: &[u8; 32], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| Error::InvalidFormat("encryption failed".into()))
}

pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(Error::InvalidFormat("bad nonce length".into()));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::BadMac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [3u8; 32];
        let nonce = random_nonce();
        let ciphertext = encrypt(&key, &nonce, b"secret key bytes").unwrap();
        let plaintext = decrypt(&key, &nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"secret key bytes");
    }

    #[test]
    fn wrong_key_fails_mac() {
        let key = [3u8; 32];
        let other = [9u8; 32];
        let nonce = random_nonce();
        let ciphertext = encrypt(&key, &nonce, b"secret key bytes").unwrap();
        assert!(matches!(decrypt(&other, &nonce, &ciphertext), Err(Error::BadMac)));
    }
}
