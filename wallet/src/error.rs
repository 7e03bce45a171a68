//! Error types for the wallet store (C9).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Password fails the ≥12 chars / ≥3-of-4 character-class policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// A wallet/backup filename resolved outside its intended directory.
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    /// AES-GCM authentication tag did not verify; wrong password or
    /// corrupted ciphertext.
    #[error("decryption failed: bad password or corrupted file")]
    BadMac,

    /// The address recovered from a decrypted/restored key does not match
    /// the address recorded in the file.
    #[error("address mismatch: file may be corrupted or tampered")]
    AddressMismatch,

    /// A field in the wallet/backup file is missing or malformed.
    #[error("invalid wallet file: {0}")]
    InvalidFormat(String),

    #[error("io error: {0}")]
    Io(String),

    #[error(transparent)]
    Core(#[from] bt2c_core::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidFormat(e.to_string())
    }
}
