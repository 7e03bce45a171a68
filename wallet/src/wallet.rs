//! The wallet itself (C9): generation, encrypted save/load, rotation, and
//! backup/restore.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use bt2c_core::address::Address;
use bt2c_core::crypto::{self, KeyPair};

use crate::aead;
use crate::error::{Error, Result};
use crate::file::{ArchivedKey, BackupFile, KdfParams, WalletFile};
use crate::kdf;
use crate::password;

const SEED_SEPARATOR: &[u8] = b"||SEPARATOR||";

/// An in-memory wallet: a keypair, its derived address, and (when the
/// wallet was generated rather than loaded from a file lacking it) the
/// mnemonic it was derived from.
pub struct Wallet {
    keypair: KeyPair,
    address: Address,
    seed_phrase: Option<String>,
    key_created_at: u64,
    previous_keys: Vec<ArchivedKey>,
}

impl Wallet {
    /// Generates a fresh wallet from a random mnemonic, or from `seed_phrase`
    /// if one is supplied (wallet recovery).
    pub fn generate(seed_phrase: Option<String>, now: u64) -> Result<Self> {
        let phrase = seed_phrase.unwrap_or_else(|| crypto::generate_mnemonic().to_string());
        let keypair = KeyPair::from_mnemonic(&phrase)?;
        let address = Address::from_public_key(&keypair.public_key());
        Ok(Wallet {
            keypair,
            address,
            seed_phrase: Some(phrase),
            key_created_at: now,
            previous_keys: Vec::new(),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn seed_phrase(&self) -> Option<&str> {
        self.seed_phrase.as_deref()
    }

    /// Encrypts and writes the wallet to `dir/filename`. `filename` must be
    /// a basename: any path component (including `..`) is rejected to keep
    /// writes confined to `dir`.
    pub fn save(&self, dir: &Path, filename: &str, password: &str) -> Result<PathBuf> {
        password::validate(password)?;
        let safe_name = reject_path_traversal(filename)?;

        std::fs::create_dir_all(dir)?;

        let mut salt = [0u8; kdf::SALT_LEN];
        rand_bytes(&mut salt);
        let kdf_params = KdfParams::default();
        let key = kdf::derive_key(password, &salt, kdf_params)?;

        let nonce = aead::random_nonce();
        let ciphertext = aead::encrypt(&key, &nonce, &self.keypair.signing_key_bytes())?;

        let wallet_file = WalletFile {
            address: self.address.as_str().to_string(),
            public_key_pem: BASE64.encode(self.keypair.public_key_bytes()),
            encrypted_private_key: BASE64.encode(ciphertext),
            salt: BASE64.encode(salt),
            iv: BASE64.encode(nonce),
            tag: None,
            kdf: "argon2id".to_string(),
            kdf_params,
            key_created_at: self.key_created_at,
            previous_keys: self.previous_keys.clone(),
            metadata: serde_json::Value::Object(Default::default()),
        };

        let path = dir.join(&safe_name);
        write_atomic(&path, &serde_json::to_vec_pretty(&wallet_file)?)?;
        tracing::info!(address = %self.address, path = %path.display(), "wallet_saved");
        Ok(path)
    }

    /// Reads and decrypts a wallet previously written by [`Wallet::save`].
    pub fn load(dir: &Path, filename: &str, password: &str) -> Result<Self> {
        let safe_name = reject_path_traversal(filename)?;
        let path = dir.join(&safe_name);
        let bytes = std::fs::read(&path)?;
        let wallet_file: WalletFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidFormat(format!("malformed wallet file: {e}")))?;

        let salt = BASE64
            .decode(&wallet_file.salt)
            .map_err(|e| Error::InvalidFormat(format!("bad salt: {e}")))?;
        let key = kdf::derive_key(password, &salt, wallet_file.kdf_params)?;

        let iv = BASE64
            .decode(&wallet_file.iv)
            .map_err(|e| Error::InvalidFormat(format!("bad iv: {e}")))?;
        let ciphertext = BASE64
            .decode(&wallet_file.encrypted_private_key)
            .map_err(|e| Error::InvalidFormat(format!("bad ciphertext: {e}")))?;
        let signing_bytes = aead::decrypt(&key, &iv, &ciphertext)?;
        let signing_bytes: [u8; 32] = signing_bytes
            .try_into()
            .map_err(|_| Error::InvalidFormat("decrypted key has wrong length".into()))?;

        let keypair = KeyPair::from_signing_key_bytes(&signing_bytes)?;
        let address = Address::from_public_key(&keypair.public_key());
        if address.as_str() != wallet_file.address {
            tracing::error!(expected = %wallet_file.address, got = %address, "wallet_address_mismatch");
            return Err(Error::AddressMismatch);
        }

        tracing::info!(address = %address, "wallet_loaded");
        Ok(Wallet {
            keypair,
            address,
            seed_phrase: None,
            key_created_at: wallet_file.key_created_at,
            previous_keys: wallet_file.previous_keys,
        })
    }

    /// Re-derives the signing key from the wallet's own seed phrase and
    /// re-saves it, optionally under a new password.
    ///
    /// Address derivation here is a pure function of the public key, and
    /// Ed25519 offers no public-key recovery: the only re-derivation that
    /// can ever preserve the address is the *identical* key the seed
    /// phrase already produces (there is no per-rotation index in
    /// [`KeyPair::from_mnemonic`]). So this "rotation" verifies the
    /// address-preservation invariant §4.9 requires, archives the
    /// pre-rotation key into `previous_keys`, and refreshes
    /// `key_created_at` and the at-rest encryption, but does not change
    /// the signing key bit-for-bit. If that invariant is ever broken by a
    /// future change to key derivation, this returns
    /// [`Error::AddressMismatch`] and refuses, per the spec's stated
    /// fallback, rather than silently changing the wallet's identity.
    pub fn rotate_keys(
        &mut self,
        dir: &Path,
        filename: &str,
        password: &str,
        new_password: Option<&str>,
        now: u64,
    ) -> Result<()> {
        let seed_phrase = self
            .seed_phrase
            .clone()
            .ok_or_else(|| Error::InvalidFormat("seed phrase unavailable; cannot rotate".into()))?;

        // Re-derive from the identical seed to prove the point: the
        // resulting key is bit-for-bit identical (no rotation index exists
        // in the derivation), so this path never actually needs to refuse
        // in practice, but is written defensively in case the derivation
        // function ever changes.
        let candidate = KeyPair::from_mnemonic(&seed_phrase)?;
        let candidate_address = Address::from_public_key(&candidate.public_key());
        if candidate_address != self.address {
            return Err(Error::AddressMismatch);
        }

        let archived = self.archive_current_key(password, now)?;
        self.previous_keys.push(archived);

        let save_password = new_password.unwrap_or(password);
        self.key_created_at = now;
        self.save(dir, filename, save_password)?;
        tracing::info!(address = %self.address, "wallet_keys_rotated");
        Ok(())
    }

    /// Encrypts the wallet's current signing key under its own fresh
    /// salt/nonce, for [`Wallet::rotate_keys`] to retire into
    /// `previous_keys` before the new key material is saved.
    fn archive_current_key(&self, password: &str, now: u64) -> Result<ArchivedKey> {
        let mut salt = [0u8; kdf::SALT_LEN];
        rand_bytes(&mut salt);
        let kdf_params = KdfParams::default();
        let key = kdf::derive_key(password, &salt, kdf_params)?;
        let nonce = aead::random_nonce();
        let ciphertext = aead::encrypt(&key, &nonce, &self.keypair.signing_key_bytes())?;

        Ok(ArchivedKey {
            public_key_pem: BASE64.encode(self.keypair.public_key_bytes()),
            encrypted_private_key: BASE64.encode(ciphertext),
            salt: BASE64.encode(salt),
            iv: BASE64.encode(nonce),
            retired_at: now,
        })
    }

    /// Writes a standalone backup combining the encrypted signing key and
    /// seed phrase, under its own salt/IV.
    pub fn create_secure_backup(&self, dir: &Path, filename: &str, password: &str, now: u64) -> Result<PathBuf> {
        password::validate(password)?;
        let safe_name = reject_path_traversal(filename)?;
        let seed_phrase = self
            .seed_phrase
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat("seed phrase unavailable; cannot back up".into()))?;

        std::fs::create_dir_all(dir)?;

        let mut combined = Vec::new();
        combined.extend_from_slice(&self.keypair.signing_key_bytes());
        combined.extend_from_slice(SEED_SEPARATOR);
        combined.extend_from_slice(seed_phrase.as_bytes());

        let mut salt = [0u8; kdf::SALT_LEN];
        rand_bytes(&mut salt);
        let kdf_params = KdfParams::default();
        let key = kdf::derive_key(password, &salt, kdf_params)?;
        let nonce = aead::random_nonce();
        let ciphertext = aead::encrypt(&key, &nonce, &combined)?;

        let backup = BackupFile {
            address: self.address.as_str().to_string(),
            key_created_at: self.key_created_at,
            backup_created_at: now,
            encrypted_data: BASE64.encode(ciphertext),
            salt: BASE64.encode(salt),
            iv: BASE64.encode(nonce),
            kdf: "argon2id".to_string(),
            kdf_params,
        };

        let path = dir.join(&safe_name);
        write_atomic(&path, &serde_json::to_vec_pretty(&backup)?)?;
        tracing::info!(address = %self.address, path = %path.display(), "wallet_backup_created");
        Ok(path)
    }

    /// Restores a wallet from a backup written by
    /// [`Wallet::create_secure_backup`].
    pub fn restore_from_backup(path: &Path, password: &str) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let backup: BackupFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidFormat(format!("malformed backup file: {e}")))?;

        let salt = BASE64
            .decode(&backup.salt)
            .map_err(|e| Error::InvalidFormat(format!("bad salt: {e}")))?;
        let key = kdf::derive_key(password, &salt, backup.kdf_params)?;
        let iv = BASE64
            .decode(&backup.iv)
            .map_err(|e| Error::InvalidFormat(format!("bad iv: {e}")))?;
        let ciphertext = BASE64
            .decode(&backup.encrypted_data)
            .map_err(|e| Error::InvalidFormat(format!("bad ciphertext: {e}")))?;
        let combined = aead::decrypt(&key, &iv, &ciphertext)?;

        let sep_pos = combined
            .windows(SEED_SEPARATOR.len())
            .position(|w| w == SEED_SEPARATOR)
            .ok_or_else(|| Error::InvalidFormat("backup missing seed separator".into()))?;
        let signing_bytes = &combined[..sep_pos];
        let seed_phrase = String::from_utf8(combined[sep_pos + SEED_SEPARATOR.len()..].to_vec())
            .map_err(|_| Error::InvalidFormat("seed phrase is not valid utf-8".into()))?;

        let signing_bytes: [u8; 32] = signing_bytes
            .try_into()
            .map_err(|_| Error::InvalidFormat("decrypted key has wrong length".into()))?;
        let keypair = KeyPair::from_signing_key_bytes(&signing_bytes)?;
        let address = Address::from_public_key(&keypair.public_key());
        if address.as_str() != backup.address {
            return Err(Error::AddressMismatch);
        }

        tracing::info!(address = %address, "wallet_restored_from_backup");
        Ok(Wallet {
            keypair,
            address,
            seed_phrase: Some(seed_phrase),
            key_created_at: backup.key_created_at,
            previous_keys: Vec::new(),
        })
    }
}

fn reject_path_traversal(filename: &str) -> Result<String> {
    let basename = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    match basename {
        Some(name) if name == filename => Ok(name),
        _ => Err(Error::PathTraversal(filename.to_string())),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn rand_bytes(buf: &mut [u8]) {
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::generate(Some(TEST_MNEMONIC.to_string()), 1000).unwrap();
        wallet.save(dir.path(), "w1.json", "Correct-Horse9!").unwrap();

        let loaded = Wallet::load(dir.path(), "w1.json", "Correct-Horse9!").unwrap();
        assert_eq!(loaded.address(), wallet.address());
    }

    #[test]
    fn wrong_password_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::generate(Some(TEST_MNEMONIC.to_string()), 1000).unwrap();
        wallet.save(dir.path(), "w1.json", "Correct-Horse9!").unwrap();

        let err = Wallet::load(dir.path(), "w1.json", "Wrong-Password9!").unwrap_err();
        assert!(matches!(err, Error::BadMac));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::generate(Some(TEST_MNEMONIC.to_string()), 1000).unwrap();
        let err = wallet
            .save(dir.path(), "../escape.json", "Correct-Horse9!")
            .unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)));
    }

    #[test]
    fn weak_password_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::generate(Some(TEST_MNEMONIC.to_string()), 1000).unwrap();
        assert!(matches!(
            wallet.save(dir.path(), "w1.json", "short"),
            Err(Error::WeakPassword(_))
        ));
    }

    #[test]
    fn backup_and_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::generate(Some(TEST_MNEMONIC.to_string()), 1000).unwrap();
        let path = wallet
            .create_secure_backup(dir.path(), "w1.backup", "Correct-Horse9!", 2000)
            .unwrap();

        let restored = Wallet::restore_from_backup(&path, "Correct-Horse9!").unwrap();
        assert_eq!(restored.address(), wallet.address());
        assert_eq!(restored.seed_phrase(), Some(TEST_MNEMONIC));
    }

    #[test]
    fn rotate_keys_preserves_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut wallet = Wallet::generate(Some(TEST_MNEMONIC.to_string()), 1000).unwrap();
        wallet.save(dir.path(), "w1.json", "Correct-Horse9!").unwrap();
        let original_address = wallet.address().clone();

        wallet
            .rotate_keys(dir.path(), "w1.json", "Correct-Horse9!", None, 2000)
            .unwrap();
        assert_eq!(wallet.address(), &original_address);
        assert_eq!(wallet.previous_keys.len(), 1);
        assert_eq!(wallet.previous_keys[0].retired_at, 2000);

        let reloaded = Wallet::load(dir.path(), "w1.json", "Correct-Horse9!").unwrap();
        assert_eq!(reloaded.previous_keys.len(), 1);
    }
}
