//! BT2C wallet store (C9): encrypted keystore, password policy, key
//! rotation, and backup/restore, built on top of `bt2c-core`'s address and
//! key-derivation primitives.

mod aead;
pub mod error;
mod file;
mod kdf;
pub mod password;
mod wallet;

pub use error::{Error, Result};
pub use file::{ArchivedKey, BackupFile, KdfParams, WalletFile};
pub use wallet::Wallet;
