//! UTXO-style value tracker (C4): owner → UTXO index, balance cache,
//! spend/rollback, validator-fee routing.
//!
//! `balance(a) == sum(u.amount for u in utxos[a])` is maintained as an
//! invariant on every mutating path; the balance cache is authoritative only
//! because of that, never a separate source of truth.

use std::collections::HashMap;

use tracing::debug;

use crate::address::Address;
use crate::amount::Amount;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// A single unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub tx_hash: String,
    pub amount: Amount,
    pub owner: Address,
    pub block_height: u64,
    pub timestamp: u64,
    pub confirmations: u64,
}

/// Bookkeeping retained per applied transaction so [`UtxoTracker::rollback`]
/// can undo it without replaying the whole chain.
#[derive(Debug, Clone)]
struct ApplyRecord {
    consumed_from_sender: Amount,
    change_amount: Amount,
    fee_credited_to: Option<Address>,
}

#[derive(Debug, Default)]
pub struct UtxoTracker {
    utxos: HashMap<Address, HashMap<String, UtxoEntry>>,
    spent_outputs: HashMap<String, Vec<Address>>,
    balance_cache: HashMap<Address, Amount>,
    current_block_height: u64,
    min_confirmations: u64,
    applied: HashMap<String, ApplyRecord>,
}

impl UtxoTracker {
    pub fn new() -> Self {
        Self {
            min_confirmations: 1,
            ..Default::default()
        }
    }

    pub fn add_utxo(&mut self, key: &str, amount: Amount, owner: &Address, height: u64, timestamp: u64) {
        let entry = UtxoEntry {
            tx_hash: key.to_string(),
            amount,
            owner: owner.clone(),
            block_height: height,
            timestamp,
            confirmations: 0,
        };
        self.utxos
            .entry(owner.clone())
            .or_default()
            .insert(key.to_string(), entry);
        let balance = self.balance_cache.entry(owner.clone()).or_insert(Amount::ZERO);
        *balance = balance.checked_add(amount).unwrap_or(*balance);
        debug!(owner = %owner, key, amount = %amount, "utxo_added");
    }

    pub fn remove_utxo(&mut self, key: &str, owner: &Address) -> bool {
        let Some(owner_map) = self.utxos.get_mut(owner) else {
            return false;
        };
        let Some(entry) = owner_map.remove(key) else {
            return false;
        };
        if let Some(balance) = self.balance_cache.get_mut(owner) {
            *balance = balance.checked_sub(entry.amount).unwrap_or(Amount::ZERO);
        }
        self.spent_outputs
            .entry(key.to_string())
            .or_default()
            .push(owner.clone());
        debug!(owner = %owner, key, amount = %entry.amount, "utxo_spent");
        true
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.balance_cache.get(address).copied().unwrap_or(Amount::ZERO)
    }

    pub fn has_sufficient_funds(&self, address: &Address, amount: Amount) -> bool {
        self.balance(address) >= amount
    }

    pub fn update_confirmations(&mut self, new_block_height: u64) {
        if new_block_height <= self.current_block_height {
            return;
        }
        let delta = new_block_height - self.current_block_height;
        self.current_block_height = new_block_height;
        for owner_map in self.utxos.values_mut() {
            for entry in owner_map.values_mut() {
                if entry.block_height > 0 {
                    entry.confirmations += delta;
                }
            }
        }
    }

    /// Sender sufficiency (amount+fee) unless coinbase; rejects if the
    /// transaction's own hash has already been consumed as a spent-output
    /// key (protects against re-applying the same transaction's effects).
    pub fn validate(&self, tx: &Transaction) -> core::result::Result<(), String> {
        let required = tx.amount.checked_add(tx.fee).map_err(|e| e.to_string())?;
        if !tx.sender.is_coinbase() && !self.has_sufficient_funds(&tx.sender, required) {
            let balance = self.balance(&tx.sender);
            return Err(format!(
                "insufficient funds: {} has {balance}, needs {required}",
                tx.sender
            ));
        }
        if self.spent_outputs.contains_key(tx.hash()) {
            return Err(format!("double-spend attempt detected for {}", tx.hash()));
        }
        Ok(())
    }

    /// Applies a validated transaction's value movement, optionally routing
    /// the fee to `validator` (the block producer including this
    /// transaction; `None` burns the fee).
    pub fn apply(&mut self, tx: &Transaction, height: u64, validator: Option<&Address>) -> Result<()> {
        self.validate(tx).map_err(Error::StateCorruption)?;

        self.add_utxo(tx.hash(), tx.amount, &tx.recipient, height, tx.timestamp);

        let mut consumed_from_sender = Amount::ZERO;
        let mut change_amount = Amount::ZERO;
        let mut fee_credited_to = None;

        if !tx.sender.is_coinbase() {
            let required = tx.amount.checked_add(tx.fee)?;
            let mut remaining = required;
            let mut ordered: Vec<UtxoEntry> = self
                .utxos
                .get(&tx.sender)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default();
            ordered.sort_by(|a, b| {
                a.confirmations
                    .cmp(&b.confirmations)
                    .then(a.amount.cmp(&b.amount))
            });

            for entry in ordered {
                if remaining.is_zero() {
                    break;
                }
                self.remove_utxo(&entry.tx_hash, &tx.sender);
                consumed_from_sender = consumed_from_sender.checked_add(entry.amount)?;
                remaining = if entry.amount >= remaining {
                    Amount::ZERO
                } else {
                    remaining.checked_sub(entry.amount)?
                };
            }

            if !remaining.is_zero() {
                return Err(Error::InsufficientFunds {
                    have: consumed_from_sender.to_string(),
                    need: required.to_string(),
                });
            }

            change_amount = consumed_from_sender.checked_sub(required)?;
            if change_amount.is_positive() {
                let key = format!("{}_change", tx.hash());
                self.add_utxo(&key, change_amount, &tx.sender, height, tx.timestamp);
            }

            if tx.fee.is_positive() {
                if let Some(validator) = validator {
                    let key = format!("{}_fee", tx.hash());
                    self.add_utxo(&key, tx.fee, validator, height, tx.timestamp);
                    fee_credited_to = Some(validator.clone());
                }
            }
        }

        self.applied.insert(
            tx.hash().to_string(),
            ApplyRecord {
                consumed_from_sender,
                change_amount,
                fee_credited_to,
            },
        );
        Ok(())
    }

    /// Inverse of [`apply`], using a synthetic `{hash}_rollback` UTXO to
    /// restore the sender's consumed value rather than reconstructing the
    /// exact original inputs.
    pub fn rollback(&mut self, tx: &Transaction) -> Result<()> {
        let Some(record) = self.applied.remove(tx.hash()) else {
            return Err(Error::StateCorruption(format!(
                "no apply record for {} to roll back",
                tx.hash()
            )));
        };

        self.remove_utxo(tx.hash(), &tx.recipient);

        if record.change_amount.is_positive() {
            let key = format!("{}_change", tx.hash());
            self.remove_utxo(&key, &tx.sender);
        }

        if let Some(validator) = &record.fee_credited_to {
            let key = format!("{}_fee", tx.hash());
            self.remove_utxo(&key, validator);
        }

        if !tx.sender.is_coinbase() && record.consumed_from_sender.is_positive() {
            let key = format!("{}_rollback", tx.hash());
            self.add_utxo(&key, record.consumed_from_sender, &tx.sender, 0, tx.timestamp);
        }

        Ok(())
    }

    pub fn min_confirmations(&self) -> u64 {
        self.min_confirmations
    }

    pub fn set_min_confirmations(&mut self, n: u64) {
        self.min_confirmations = n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkType;
    use crate::transaction::{NewTransaction, TransactionType};

    fn transfer(sender: &str, recipient: &str, amount: &str, fee: &str, nonce: u64) -> Transaction {
        Transaction::new(NewTransaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: Amount::parse(amount).unwrap(),
            fee: Amount::parse(fee).unwrap(),
            nonce,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Transfer,
            payload: None,
            timestamp: Some(1000),
        })
        .unwrap()
    }

    #[test]
    fn apply_moves_value_and_tracks_change() {
        let mut utxo = UtxoTracker::new();
        utxo.add_utxo("genesis", Amount::from_whole(100), &"bt2c_a".into(), 1, 1000);

        let t1 = transfer("bt2c_a", "bt2c_b", "10", "1", 0);
        utxo.apply(&t1, 2, None).unwrap();

        assert_eq!(utxo.balance(&"bt2c_a".into()), Amount::parse("89").unwrap());
        assert_eq!(utxo.balance(&"bt2c_b".into()), Amount::parse("10").unwrap());
    }

    #[test]
    fn apply_rejects_insufficient_funds() {
        let mut utxo = UtxoTracker::new();
        utxo.add_utxo("genesis", Amount::from_whole(5), &"bt2c_a".into(), 1, 1000);
        let t1 = transfer("bt2c_a", "bt2c_b", "10", "1", 0);
        assert!(utxo.apply(&t1, 2, None).is_err());
    }

    #[test]
    fn rollback_restores_balances() {
        let mut utxo = UtxoTracker::new();
        utxo.add_utxo("genesis", Amount::from_whole(100), &"bt2c_a".into(), 1, 1000);
        let t1 = transfer("bt2c_a", "bt2c_b", "10", "1", 0);
        utxo.apply(&t1, 2, None).unwrap();
        utxo.rollback(&t1).unwrap();

        assert_eq!(utxo.balance(&"bt2c_a".into()), Amount::from_whole(100));
        assert_eq!(utxo.balance(&"bt2c_b".into()), Amount::ZERO);
    }

    #[test]
    fn fee_routes_to_validator_when_set() {
        let mut utxo = UtxoTracker::new();
        utxo.add_utxo("genesis", Amount::from_whole(100), &"bt2c_a".into(), 1, 1000);
        let t1 = transfer("bt2c_a", "bt2c_b", "10", "1", 0);
        let validator: Address = "bt2c_validator".into();
        utxo.apply(&t1, 2, Some(&validator)).unwrap();
        assert_eq!(utxo.balance(&validator), Amount::parse("1").unwrap());
    }

    #[test]
    fn double_spend_rejection_matches_scenario_two() {
        let mut utxo = UtxoTracker::new();
        utxo.add_utxo("genesis", Amount::from_whole(100), &"bt2c_a".into(), 1, 1000);

        let t1 = transfer("bt2c_a", "bt2c_b", "10", "1", 0);
        utxo.apply(&t1, 2, None).unwrap();

        // T2 tries to spend 90+1 but only 89 remains: insufficient funds.
        let t2 = transfer("bt2c_a", "bt2c_b", "90", "1", 1);
        assert!(utxo.apply(&t2, 3, None).is_err());

        assert_eq!(utxo.balance(&"bt2c_a".into()), Amount::parse("89").unwrap());
        assert_eq!(utxo.balance(&"bt2c_b".into()), Amount::parse("10").unwrap());
    }
}
