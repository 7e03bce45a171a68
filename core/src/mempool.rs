//! Mempool (C6): fee-priority queuing, Replace-By-Fee, ancestor/descendant
//! accounting, congestion-driven minimum fees, time-based eviction.
//!
//! The mempool reads chain state (nonce tracker, spent set) through the
//! read-only [`ChainView`] interface and never writes to it; all of its own
//! mutations are confined to its own indices, per the concurrency model in
//! the system design.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::address::Address;
use crate::amount::Amount;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// Read-only view into the chain's replay-protection state, so the mempool
/// can check nonces and spent hashes without taking a write lock on chain
/// state.
pub trait ChainView {
    /// The next nonce the chain expects from `address` (0 if none applied).
    fn expected_nonce(&self, address: &Address) -> u64;
    /// Whether `hash` has already been applied on-chain.
    fn is_spent(&self, hash: &str) -> bool;
}

/// Eviction class, determining how long an entry is retained absent
/// replacement or chain inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionClass {
    Suspicious,
    LowFee,
    Default,
}

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub transaction: Transaction,
    pub received_at: u64,
    pub size_bytes: usize,
    pub fee_per_byte: f64,
    pub priority_score: f64,
    pub ancestor_fee: f64,
    pub ancestor_size: usize,
    pub descendant_fee: f64,
    pub descendant_size: usize,
    pub dependencies: HashSet<String>,
    pub replaced_by: Option<String>,
    pub suspicious: bool,
    pub eviction_class: EvictionClass,
    pub expires_at: u64,
    pub is_valid: bool,
    pub validation_message: String,
}

impl MempoolEntry {
    /// Recomputes the priority score against `now`, per §4.6's
    /// `age_seconds/3600` age bonus. Callers must re-invoke this whenever
    /// elapsed mempool time should be reflected, not only at insertion.
    fn recompute_priority(&mut self, now: u64) {
        let mut score = self.fee_per_byte * 1000.0;

        let age = now.saturating_sub(self.received_at);
        let age_factor = (age as f64 / 3600.0).min(0.20);
        score *= 1.0 + age_factor;

        let size_factor = (1.0 - self.size_bytes as f64 / 10_000.0).clamp(0.0, 0.10);
        score *= 1.0 + size_factor;

        if self.ancestor_size > self.size_bytes {
            let rate = self.ancestor_fee / (self.ancestor_size.max(1) as f64);
            score *= 1.0 + (rate / 10.0).min(0.15);
        }
        if self.descendant_size > self.size_bytes {
            let rate = self.descendant_fee / (self.descendant_size.max(1) as f64);
            score *= 1.0 + (rate / 10.0).min(0.15);
        }
        self.priority_score = score;
    }
}

#[derive(Debug, Clone)]
struct HeapKey {
    score: f64,
    fee_per_byte: f64,
    received_at: u64,
    hash: String,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
impl Eq for HeapKey {}
impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.fee_per_byte.total_cmp(&other.fee_per_byte))
            .then_with(|| other.received_at.cmp(&self.received_at)) // earlier wins ties
    }
}

pub struct MempoolConfig {
    pub max_bytes: u64,
    pub expiry_default: u64,
    pub expiry_low_fee: u64,
    pub expiry_suspicious: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            expiry_default: 86_400,
            expiry_low_fee: 3_600,
            expiry_suspicious: 600,
        }
    }
}

pub struct Mempool {
    config: MempoolConfig,
    entries: HashMap<String, MempoolEntry>,
    by_sender: HashMap<Address, HashSet<String>>,
    by_recipient: HashMap<Address, HashSet<String>>,
    nonce_index: HashMap<Address, BTreeMap<u64, String>>,
    dependents: HashMap<String, HashSet<String>>,
    total_bytes: u64,
    congestion: f64,
    last_congestion_update: u64,
    validation_queue: VecDeque<String>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_sender: HashMap::new(),
            by_recipient: HashMap::new(),
            nonce_index: HashMap::new(),
            dependents: HashMap::new(),
            total_bytes: 0,
            congestion: 0.0,
            last_congestion_update: 0,
            validation_queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    fn mempool_max_nonce(&self, sender: &Address) -> Option<u64> {
        self.nonce_index.get(sender).and_then(|m| m.keys().next_back().copied())
    }

    /// EWMA congestion update, run at most every 10 seconds.
    fn tick_congestion(&mut self, now: u64) {
        if now.saturating_sub(self.last_congestion_update) < 10 && self.last_congestion_update != 0 {
            return;
        }
        let utilization = self.total_bytes as f64 / self.config.max_bytes as f64;
        self.congestion = 0.8 * self.congestion + 0.2 * utilization;
        self.last_congestion_update = now;
    }

    /// Minimum fee rate, in 1e-8-BT2C units per byte, imposed by the current
    /// congestion level.
    pub fn min_fee_rate(&self) -> f64 {
        let c = self.congestion;
        let multiple = if c >= 0.8 {
            50.0 + (c - 0.8) * 250.0
        } else if c >= 0.5 {
            10.0 + (c - 0.5) * (40.0 / 0.3)
        } else if c >= 0.3 {
            2.0 + (c - 0.3) * 40.0
        } else {
            1.0
        };
        multiple * 1e-8
    }

    pub fn congestion(&self) -> f64 {
        self.congestion
    }

    /// Admits `tx` into the mempool, or returns an admission error. `chain`
    /// is consulted read-only for nonce/replay checks.
    pub fn add(&mut self, tx: Transaction, chain: &dyn ChainView, now: u64) -> Result<()> {
        let hash = tx.hash().to_string();
        if self.entries.contains_key(&hash) {
            return Err(Error::ReplayDetected);
        }
        if tx.is_expired(now) {
            return Err(Error::Expired);
        }

        self.tick_congestion(now);

        let rbf_target = self
            .nonce_index
            .get(&tx.sender)
            .and_then(|m| m.get(&tx.nonce))
            .cloned();

        if let Some(old_hash) = &rbf_target {
            let old_fee = self.entries[old_hash].transaction.fee;
            // new.fee >= 1.10 * old.fee, compared without floating point.
            if tx.fee.units() * 10 < old_fee.units() * 11 {
                return Err(Error::FeeTooLow {
                    fee_rate: tx.fee.to_string(),
                    floor: (old_fee.units() as f64 * 1.10 / 1e8).to_string(),
                });
            }
        } else {
            let last_applied: i64 = chain.expected_nonce(&tx.sender) as i64 - 1;
            let mempool_highest: i64 = self
                .mempool_max_nonce(&tx.sender)
                .map(|n| n as i64)
                .unwrap_or(-1);
            let expected = last_applied.max(mempool_highest) + 1;
            if tx.nonce as i64 != expected {
                return Err(Error::NonceGap {
                    expected: expected.max(0) as u64,
                    got: tx.nonce,
                });
            }
        }

        if chain.is_spent(tx.hash()) {
            return Err(Error::ReplayDetected);
        }

        let size = tx.size_bytes();
        let fee_per_byte = tx.fee.units() as f64 / size.max(1) as f64;
        // min_fee_rate is expressed in raw BT2C per byte (matching the
        // grounded reference's `float(tx.fee) / size < float(min_fee_rate)`,
        // where tx.fee is already in whole-BT2C Decimal); fee_per_byte above
        // is satoshi-per-byte (1e8 finer), so convert before comparing.
        let fee_rate_bt2c = fee_per_byte / 1e8;
        if self.is_congested() && fee_rate_bt2c < self.min_fee_rate() {
            return Err(Error::FeeTooLow {
                fee_rate: fee_rate_bt2c.to_string(),
                floor: self.min_fee_rate().to_string(),
            });
        }

        if let Some(old_hash) = rbf_target {
            self.replace(&old_hash, tx, now);
        } else {
            self.insert_new(tx, now);
        }

        self.enforce_capacity(now);
        Ok(())
    }

    fn is_congested(&self) -> bool {
        self.congestion > 0.0
    }

    fn dependencies_for(&self, sender: &Address, nonce: u64) -> HashSet<String> {
        self.nonce_index
            .get(sender)
            .map(|m| m.range(..nonce).map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    fn classify(&self, tx: &Transaction, fee_per_byte: f64) -> (bool, EvictionClass, u64) {
        let fee_threshold = tx.amount.div_round_down(20);
        let suspicious = tx.fee > fee_threshold
            || (tx.amount.units() % 100_000_000 == 0 && tx.amount.units() >= 10 * 100_000_000);
        if suspicious {
            return (true, EvictionClass::Suspicious, self.config.expiry_suspicious);
        }
        if self.is_low_fee_quartile(fee_per_byte) {
            return (false, EvictionClass::LowFee, self.config.expiry_low_fee);
        }
        (false, EvictionClass::Default, self.config.expiry_default)
    }

    fn is_low_fee_quartile(&self, fee_per_byte: f64) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let mut rates: Vec<f64> = self.entries.values().map(|e| e.fee_per_byte).collect();
        rates.sort_by(f64::total_cmp);
        let idx = rates.len() / 4;
        fee_per_byte <= rates.get(idx).copied().unwrap_or(f64::MAX)
    }

    fn insert_new(&mut self, tx: Transaction, now: u64) {
        let hash = tx.hash().to_string();
        let size = tx.size_bytes();
        let fee_per_byte = tx.fee.units() as f64 / size.max(1) as f64;
        let dependencies = self.dependencies_for(&tx.sender, tx.nonce);
        let (suspicious, eviction_class, horizon) = self.classify(&tx, fee_per_byte);

        let ancestor_fee: f64 = dependencies
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.transaction.fee.units() as f64)
            .sum::<f64>()
            + tx.fee.units() as f64;
        let ancestor_size: usize = dependencies
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.size_bytes)
            .sum::<usize>()
            + size;

        let mut entry = MempoolEntry {
            transaction: tx.clone(),
            received_at: now,
            size_bytes: size,
            fee_per_byte,
            priority_score: 0.0,
            ancestor_fee,
            ancestor_size,
            descendant_fee: tx.fee.units() as f64,
            descendant_size: size,
            dependencies: dependencies.clone(),
            replaced_by: None,
            suspicious,
            eviction_class,
            expires_at: now + horizon,
            is_valid: true,
            validation_message: String::new(),
        };
        entry.recompute_priority(now);

        self.by_sender.entry(tx.sender.clone()).or_default().insert(hash.clone());
        self.by_recipient
            .entry(tx.recipient.clone())
            .or_default()
            .insert(hash.clone());
        self.nonce_index
            .entry(tx.sender.clone())
            .or_default()
            .insert(tx.nonce, hash.clone());

        for dep in &dependencies {
            self.dependents.entry(dep.clone()).or_default().insert(hash.clone());
        }

        self.total_bytes += size as u64;
        self.entries.insert(hash.clone(), entry);
        self.validation_queue.push_back(hash.clone());

        self.propagate_descendant_totals(&dependencies, tx.fee.units() as f64, size, now);
        debug!(tx_hash = %hash, "mempool_transaction_admitted");
    }

    fn propagate_descendant_totals(
        &mut self,
        ancestors: &HashSet<String>,
        fee_units: f64,
        size: usize,
        now: u64,
    ) {
        for anc in ancestors {
            if let Some(entry) = self.entries.get_mut(anc) {
                entry.descendant_fee += fee_units;
                entry.descendant_size += size;
                entry.recompute_priority(now);
            }
        }
    }

    fn replace(&mut self, old_hash: &str, new_tx: Transaction, now: u64) {
        if let Some(old_entry) = self.entries.get_mut(old_hash) {
            old_entry.replaced_by = Some(new_tx.hash().to_string());
            self.total_bytes = self.total_bytes.saturating_sub(old_entry.size_bytes as u64);
        }
        info!(old_hash, new_hash = new_tx.hash(), "mempool_rbf_replacement");
        self.insert_new(new_tx, now);
    }

    /// Pops the heap-ordered candidates until `n` valid, unreplaced entries
    /// are returned, honoring per-sender nonce ordering: a transaction is
    /// only offered once every dependency it has is either already selected
    /// or no longer present in the mempool (applied elsewhere).
    pub fn top(&self, n: usize) -> Vec<Transaction> {
        let mut candidates: Vec<&MempoolEntry> = self
            .entries
            .values()
            .filter(|e| e.replaced_by.is_none() && e.is_valid)
            .collect();
        candidates.sort_by(|a, b| {
            HeapKey {
                score: b.priority_score,
                fee_per_byte: b.fee_per_byte,
                received_at: b.received_at,
                hash: b.transaction.hash().to_string(),
            }
            .cmp(&HeapKey {
                score: a.priority_score,
                fee_per_byte: a.fee_per_byte,
                received_at: a.received_at,
                hash: a.transaction.hash().to_string(),
            })
        });

        let mut selected = Vec::new();
        let mut selected_hashes: HashSet<&str> = HashSet::new();
        let mut progressed = true;
        while selected.len() < n && progressed {
            progressed = false;
            for entry in &candidates {
                if selected.len() >= n {
                    break;
                }
                let hash = entry.transaction.hash();
                if selected_hashes.contains(hash) {
                    continue;
                }
                let ready = entry
                    .dependencies
                    .iter()
                    .all(|d| selected_hashes.contains(d.as_str()) || !self.entries.contains_key(d));
                if ready {
                    selected_hashes.insert(hash);
                    selected.push(entry.transaction.clone());
                    progressed = true;
                }
            }
        }
        selected
    }

    /// Drops `hash` from all indices without marking it replaced, used when
    /// the chain applies it in a block.
    pub fn remove(&mut self, hash: &str) {
        let Some(entry) = self.entries.remove(hash) else {
            return;
        };
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes as u64);
        if let Some(set) = self.by_sender.get_mut(&entry.transaction.sender) {
            set.remove(hash);
        }
        if let Some(set) = self.by_recipient.get_mut(&entry.transaction.recipient) {
            set.remove(hash);
        }
        if let Some(m) = self.nonce_index.get_mut(&entry.transaction.sender) {
            m.remove(&entry.transaction.nonce);
        }
        self.dependents.remove(hash);
    }

    /// Scans for expired entries and, if still over the hard-pressure
    /// threshold (90%), shrinks to the soft threshold (70%) by priority.
    pub fn evict(&mut self, now: u64) -> Vec<String> {
        let mut evicted = Vec::new();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(h, _)| h.clone())
            .collect();
        for hash in expired {
            self.remove(&hash);
            evicted.push(hash);
        }

        let hard = (self.config.max_bytes as f64 * 0.90) as u64;
        let soft = (self.config.max_bytes as f64 * 0.70) as u64;
        if self.total_bytes > hard {
            evicted.extend(self.shrink_to(soft));
        }
        evicted
    }

    fn enforce_capacity(&mut self, _now: u64) {
        if self.total_bytes > self.config.max_bytes {
            let soft = (self.config.max_bytes as f64 * 0.70) as u64;
            self.shrink_to(soft);
        }
    }

    fn shrink_to(&mut self, target_bytes: u64) -> Vec<String> {
        let mut removed = Vec::new();
        let mut ordered: Vec<(String, u64, bool, u64, f64)> = self
            .entries
            .iter()
            .map(|(h, e)| (h.clone(), e.expires_at, e.suspicious, e.size_bytes as u64, e.priority_score))
            .collect();
        // expired-soonest first, suspicious/high-fee retained preferentially
        ordered.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then(b.2.cmp(&a.2).reverse())
                .then(a.4.total_cmp(&b.4))
        });
        for (hash, _, _, size, _) in ordered {
            if self.total_bytes <= target_bytes {
                break;
            }
            self.remove(&hash);
            self.total_bytes = self.total_bytes.saturating_sub(size);
            removed.push(hash);
        }
        removed
    }

    /// Processes up to `max_batch` queued validations, re-checking expiry
    /// and nonce/replay state against `chain` and refreshing each entry's
    /// age-adjusted priority score. Models the background validation worker
    /// synchronously: the async collaborator layer is expected to call this
    /// on a tick, round-robin re-queuing each hash it visits.
    pub fn process_validation_queue(&mut self, max_batch: usize, chain: &dyn ChainView, now: u64) {
        for _ in 0..max_batch {
            let Some(hash) = self.validation_queue.pop_front() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(&hash) else {
                continue;
            };
            if entry.transaction.is_expired(now) {
                entry.is_valid = false;
                entry.validation_message = "expired".into();
            } else if chain.is_spent(entry.transaction.hash()) {
                entry.is_valid = false;
                entry.validation_message = "replay".into();
            }
            entry.recompute_priority(now);
            self.validation_queue.push_back(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkType;
    use crate::transaction::{NewTransaction, TransactionType};

    struct FakeChain {
        nonces: HashMap<Address, u64>,
        spent: HashSet<String>,
    }
    impl ChainView for FakeChain {
        fn expected_nonce(&self, address: &Address) -> u64 {
            *self.nonces.get(address).unwrap_or(&0)
        }
        fn is_spent(&self, hash: &str) -> bool {
            self.spent.contains(hash)
        }
    }
    impl FakeChain {
        fn new() -> Self {
            Self {
                nonces: HashMap::new(),
                spent: HashSet::new(),
            }
        }
    }

    fn transfer(sender: &str, nonce: u64, fee: &str, ts: u64) -> Transaction {
        Transaction::new(NewTransaction {
            sender: sender.into(),
            recipient: "bt2c_recipient".into(),
            amount: Amount::from_whole(1),
            fee: Amount::parse(fee).unwrap(),
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
    fn rejects_nonce_gap() {
        let mut mempool = Mempool::new(MempoolConfig::default());
        let chain = FakeChain::new();
        let tx = transfer("bt2c_a", 1, "0.0001", 1000);
        let err = mempool.add(tx, &chain, 1000).unwrap_err();
        assert_eq!(err, Error::NonceGap { expected: 0, got: 1 });
    }

    #[test]
    fn accepts_sequential_nonces() {
        let mut mempool = Mempool::new(MempoolConfig::default());
        let chain = FakeChain::new();
        mempool.add(transfer("bt2c_a", 0, "0.0001", 1000), &chain, 1000).unwrap();
        mempool.add(transfer("bt2c_a", 1, "0.0001", 1000), &chain, 1000).unwrap();
        assert_eq!(mempool.len(), 2);
    }

    #[test]
    fn rbf_requires_ten_percent_fee_bump() {
        let mut mempool = Mempool::new(MempoolConfig::default());
        let chain = FakeChain::new();
        let t1 = transfer("bt2c_a", 0, "0.0001", 1000);
        mempool.add(t1, &chain, 1000).unwrap();

        let t2_low = transfer("bt2c_a", 0, "0.000105", 1001);
        assert!(mempool.add(t2_low, &chain, 1001).is_err());

        let t2_ok = transfer("bt2c_a", 0, "0.00011", 1002);
        assert!(mempool.add(t2_ok, &chain, 1002).is_ok());
    }

    #[test]
    fn top_skips_replaced_entries() {
        let mut mempool = Mempool::new(MempoolConfig::default());
        let chain = FakeChain::new();
        let t1 = transfer("bt2c_a", 0, "0.0001", 1000);
        let t1_hash = t1.hash().to_string();
        mempool.add(t1, &chain, 1000).unwrap();
        let t2 = transfer("bt2c_a", 0, "0.00011", 1001);
        let t2_hash = t2.hash().to_string();
        mempool.add(t2, &chain, 1001).unwrap();

        let top = mempool.top(10);
        let hashes: Vec<&str> = top.iter().map(|t| t.hash()).collect();
        assert!(hashes.contains(&t2_hash.as_str()));
        assert!(!hashes.contains(&t1_hash.as_str()));
    }

    #[test]
    fn duplicate_transaction_rejected() {
        let mut mempool = Mempool::new(MempoolConfig::default());
        let chain = FakeChain::new();
        let tx = transfer("bt2c_a", 0, "0.0001", 1000);
        mempool.add(tx.clone(), &chain, 1000).unwrap();
        assert!(mempool.add(tx, &chain, 1000).is_err());
    }
}
