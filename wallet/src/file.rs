//! On-disk wallet/backup file layout (§4.9).

use serde::{Deserialize, Serialize};

/// Argon2id tuning, recorded alongside every encrypted blob so a future
/// reader can decrypt even if the process defaults change later.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP-recommended Argon2id baseline: 19 MiB, 2 passes, 1 lane.
        KdfParams {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// A key archived by [`crate::wallet::Wallet::rotate_keys`]. Carries enough
/// to decrypt the retired private key independently of the current one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedKey {
    pub public_key_pem: String,
    pub encrypted_private_key: String,
    pub salt: String,
    pub iv: String,
    pub retired_at: u64,
}

/// The wallet file (§4.9). `public_key_pem` is named for the field the spec
/// enumerates; since this wallet's keys are Ed25519 rather than RSA, it
/// holds the base64 of the raw 32-byte public key rather than a PEM block.
/// `tag` is left unset: `aes-gcm` appends the authentication tag to its
/// ciphertext output, so `encrypted_private_key` already carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFile {
    pub address: String,
    pub public_key_pem: String,
    pub encrypted_private_key: String,
    pub salt: String,
    pub iv: String,
    pub tag: Option<String>,
    pub kdf: String,
    pub kdf_params: KdfParams,
    pub key_created_at: u64,
    #[serde(default)]
    pub previous_keys: Vec<ArchivedKey>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A standalone backup combining the encrypted private key and seed phrase
/// under its own salt/IV, separate from the day-to-day wallet file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFile {
    pub address: String,
    pub key_created_at: u64,
    pub backup_created_at: u64,
    pub encrypted_data: String,
    pub salt: String,
    pub iv: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
}
