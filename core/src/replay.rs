//! Replay protection (C3): per-sender nonce tracking, a spent-hash set, and
//! expiry checks. Nonce monotonicity is a consensus invariant — the chain
//! may only include a transaction whose nonce equals the sender's current
//! expected nonce at the moment the block is applied.

use std::collections::{HashMap, HashSet};

use crate::address::Address;
use crate::transaction::Transaction;

/// Tracks per-address expected nonces and the set of spent transaction
/// hashes. Owned by the [`crate::chain::Chain`]; rebuilt from the chain
/// after a reorg since it is a pure function of applied history.
#[derive(Debug, Default, Clone)]
pub struct ReplayProtection {
    expected_nonce: HashMap<Address, u64>,
    spent: HashSet<String>,
}

impl ReplayProtection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_nonce(&self, address: &Address) -> u64 {
        *self.expected_nonce.get(address).unwrap_or(&0)
    }

    /// `false` iff `tx.is_expired(now)`.
    pub fn validate_expiry(&self, tx: &Transaction, now: u64) -> bool {
        !tx.is_expired(now)
    }

    /// `true` iff `tx.hash` has already been marked spent.
    pub fn is_replay(&self, tx: &Transaction) -> bool {
        self.spent.contains(tx.hash())
    }

    /// `true` iff `tx.nonce == expected_nonce[tx.sender]`; on success,
    /// advances the expected nonce.
    pub fn validate_nonce(&mut self, tx: &Transaction) -> bool {
        let expected = self.expected_nonce(&tx.sender);
        if tx.nonce != expected {
            return false;
        }
        self.expected_nonce.insert(tx.sender.clone(), expected + 1);
        true
    }

    /// Reads the expected nonce without mutating state, for mempool
    /// admission checks that must not advance consensus state themselves.
    pub fn peek_nonce_valid(&self, tx: &Transaction) -> bool {
        tx.nonce == self.expected_nonce(&tx.sender)
    }

    pub fn mark_spent(&mut self, tx: &Transaction) {
        self.spent.insert(tx.hash().to_string());
    }

    pub fn is_spent(&self, hash: &str) -> bool {
        self.spent.contains(hash)
    }

    /// `expiry ∧ ¬replay ∧ nonce-valid`, then `mark_spent`.
    pub fn process(&mut self, tx: &Transaction, now: u64) -> bool {
        if !self.validate_expiry(tx, now) {
            return false;
        }
        if self.is_replay(tx) {
            return false;
        }
        if !self.validate_nonce(tx) {
            return false;
        }
        self.mark_spent(tx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::config::NetworkType;
    use crate::transaction::{NewTransaction, TransactionType};

    fn tx(sender: &str, nonce: u64, ts: u64) -> Transaction {
        Transaction::new(NewTransaction {
            sender: sender.into(),
            recipient: "bt2c_recipient".into(),
            amount: Amount::from_whole(1),
            fee: Amount::SATOSHI,
            nonce,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Transfer,
            payload: None,
            timestamp: Some(ts),
        })
        .unwrap()
    }

    #[test]
    fn nonce_must_start_at_zero_and_increment() {
        let mut rp = ReplayProtection::new();
        let t1 = tx("bt2c_a", 1, 1000);
        assert!(!rp.validate_nonce(&t1)); // gap: expects 0

        let t0 = tx("bt2c_a", 0, 1000);
        assert!(rp.validate_nonce(&t0));
        assert_eq!(rp.expected_nonce(&"bt2c_a".into()), 1);

        let t3 = tx("bt2c_a", 3, 1000);
        assert!(!rp.validate_nonce(&t3));
    }

    #[test]
    fn replay_of_same_hash_is_detected() {
        let mut rp = ReplayProtection::new();
        let t0 = tx("bt2c_a", 0, 1000);
        assert!(rp.process(&t0, 1000));
        assert!(rp.is_replay(&t0));
        assert!(!rp.process(&t0, 1000));
    }

    #[test]
    fn expiry_rejects_stale_transactions() {
        let rp = ReplayProtection::new();
        let t0 = tx("bt2c_a", 0, 1000);
        assert!(rp.validate_expiry(&t0, 1000 + 100));
        assert!(!rp.validate_expiry(&t0, 1000 + 3601));
    }
}
