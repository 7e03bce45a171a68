//! Double-spend detector (C5): composes C3 (replay protection) and C4 (UTXO
//! tracker), flags suspicious transactions, and tracks finality.

use std::collections::HashMap;

use tracing::warn;

use crate::address::Address;
use crate::amount::Amount;
use crate::error::{Error, Result};
use crate::replay::ReplayProtection;
use crate::transaction::Transaction;
use crate::utxo::UtxoTracker;

/// A recorded suspicious/double-spend observation, kept only for
/// observability (`get_metrics`), never for rejection.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub tx_hash: String,
    pub timestamp: u64,
    pub kind: &'static str,
}

#[derive(Debug, Default)]
pub struct DoubleSpendDetector {
    pub replay: ReplayProtection,
    pub utxo: UtxoTracker,
    finality_threshold: u64,
    attempts: HashMap<Address, Vec<Attempt>>,
}

impl DoubleSpendDetector {
    pub fn new() -> Self {
        Self {
            finality_threshold: 6,
            ..Default::default()
        }
    }

    /// Runs expiry → replay → nonce → UTXO validation in that order,
    /// short-circuiting on the first failure.
    pub fn validate(&mut self, tx: &Transaction, now: u64) -> core::result::Result<(), Error> {
        if !self.replay.validate_expiry(tx, now) {
            return Err(Error::Expired);
        }
        if self.replay.is_replay(tx) {
            self.record_attempt(tx, "replay_attempt", now);
            return Err(Error::ReplayDetected);
        }
        // The coinbase sentinel issues one reward/developer transaction per
        // block, all sharing the same sender; it has no per-sender nonce
        // sequence to track, only the hash-based replay check above.
        if !tx.sender.is_coinbase() {
            let expected = self.replay.expected_nonce(&tx.sender);
            if tx.nonce != expected {
                return Err(Error::NonceGap {
                    expected,
                    got: tx.nonce,
                });
            }
        }
        if let Err(msg) = self.utxo.validate(tx) {
            self.record_attempt(tx, "insufficient_funds", now);
            return Err(Error::InsufficientFunds {
                have: self.utxo.balance(&tx.sender).to_string(),
                need: tx.amount.checked_add(tx.fee)?.to_string(),
            }
            .with_context(msg));
        }
        if self.is_suspicious(tx) {
            warn!(tx_hash = tx.hash(), "suspicious_transaction_pattern");
        }
        Ok(())
    }

    /// Validate; then mark spent; then apply. If apply fails the spent mark
    /// is *not* rolled back — a failed apply implies inconsistent state that
    /// the chain layer discards via rebuild, not a case the detector can
    /// safely paper over.
    pub fn process(
        &mut self,
        tx: &Transaction,
        height: u64,
        now: u64,
        validator: Option<&Address>,
    ) -> Result<()> {
        self.validate(tx, now)?;
        if !tx.sender.is_coinbase() {
            self.replay.validate_nonce(tx);
        }
        self.replay.mark_spent(tx);
        self.utxo.apply(tx, height, validator)
    }

    fn is_suspicious(&self, tx: &Transaction) -> bool {
        let fee_threshold = tx.amount.div_round_down(20); // amount * 0.05
        if tx.fee > fee_threshold {
            return true;
        }
        let whole_units = 10 * 100_000_000_i128;
        tx.amount.units() % 100_000_000 == 0 && tx.amount.units() >= whole_units
    }

    fn record_attempt(&mut self, tx: &Transaction, kind: &'static str, now: u64) {
        self.attempts.entry(tx.sender.clone()).or_default().push(Attempt {
            tx_hash: tx.hash().to_string(),
            timestamp: now,
            kind,
        });
    }

    pub fn attempts_for(&self, address: &Address) -> &[Attempt] {
        self.attempts.get(address).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn finality_tier(&self, confirmations: u64) -> FinalityTier {
        if confirmations == 0 {
            FinalityTier::Pending
        } else if confirmations <= 2 {
            FinalityTier::Tentative
        } else if confirmations <= 5 {
            FinalityTier::Probable
        } else if confirmations >= self.finality_threshold {
            FinalityTier::Final
        } else {
            FinalityTier::Probable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityTier {
    Pending,
    Tentative,
    Probable,
    Final,
}

impl Error {
    fn with_context(self, context: String) -> Self {
        match self {
            Error::InsufficientFunds { have, need } => Error::InsufficientFunds {
                have: format!("{have} ({context})"),
                need,
            },
            other => other,
        }
    }
}
