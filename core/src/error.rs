//! Error types for the **BT2C** core crate.
//!
//! All high-level operations return [`crate::Result`], a convenient alias for
//! `core::result::Result<T, Error>`. Lower-level errors (signature library
//! failures, serialization issues) are mapped into one of these variants
//! before bubbling up to callers.

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// Malformed decimal, oversized value, bad base64, or non-canonical
    /// serialization.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Signature does not verify against the sender's public key.
    #[error("signature verification failed")]
    BadSignature,

    /// Transaction is past its expiry, or a block's timestamp is stale.
    #[error("transaction or block expired")]
    Expired,

    /// Transaction hash has already been spent.
    #[error("replay detected")]
    ReplayDetected,

    /// Nonce is ahead of the sender's expected nonce.
    #[error("nonce gap: expected {expected}, got {got}")]
    NonceGap { expected: u64, got: u64 },

    /// Nonce has already been consumed by a previously applied transaction.
    #[error("nonce replay: expected {expected}, got {got}")]
    NonceReplay { expected: u64, got: u64 },

    /// Sender cannot cover `amount + fee`.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: String, need: String },

    /// The referenced UTXO has already been consumed.
    #[error("double spend attempted")]
    DoubleSpend,

    /// Fee is below the mempool's current congestion floor.
    #[error("fee too low: {fee_rate} below floor {floor}")]
    FeeTooLow { fee_rate: String, floor: String },

    /// Block producer is not a registered validator outside the distribution
    /// phase.
    #[error("unauthorized block producer")]
    Unauthorized,

    /// Block's `previous_hash` does not match the chain tip.
    #[error("previous hash does not match chain tip")]
    Conflict,

    /// Recomputed Merkle root or block hash does not match the stored value.
    #[error("merkle root or block hash mismatch")]
    IntegrityFailure,

    /// C3/C4 invariants have been violated; fatal, forces a rebuild from the
    /// canonical chain.
    #[error("state corruption detected: {0}")]
    StateCorruption(String),

    /// Placeholder for errors originating from external crates.
    #[error("{0}")]
    Other(String),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
