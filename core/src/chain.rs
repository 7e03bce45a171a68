//! Chain / Ledger (C8): block production and application, halving
//! schedule, validator registry, fork resolution, state queries and
//! snapshotting.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::{Address, AddressBook};
use crate::amount::Amount;
use crate::block::{Block, ZERO_HASH};
use crate::config::{Config, GenesisConfig};
use crate::double_spend::DoubleSpendDetector;
use crate::error::{Error, Result};
use crate::mempool::{ChainView, Mempool, MempoolConfig};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::transaction::{NewTransaction, Transaction, TransactionType};

/// Registration record for a validator, per §3's Chain State.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatorInfo {
    pub stake: Amount,
    pub registered_at: u64,
    pub status: ValidatorStatus,
    pub blocks_produced: u64,
    pub last_block_time: u64,
    pub reputation: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorStatus {
    Active,
    Inactive,
}

/// Finality classification returned by [`Chain::get_transaction_with_finality`].
#[derive(Debug, Clone, PartialEq)]
pub enum TxLookup {
    Pending(Transaction),
    InChain {
        transaction: Transaction,
        block_height: u64,
        confirmations: u64,
        finality: crate::double_spend::FinalityTier,
    },
}

/// Canonical, JSON-serializable state snapshot for `export_state`/`import_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub validator_set: HashMap<Address, ValidatorInfo>,
    pub target_block_time: u64,
    pub max_supply: Amount,
    pub initial_block_reward: Amount,
    pub halving_period: u64,
    pub halving_interval: u64,
    pub min_reward: Amount,
    pub distribution_blocks: u64,
    pub distribution_reward: Amount,
    pub developer_reward: Amount,
    pub early_validator_reward: Amount,
    pub nonce_tracker: HashMap<Address, u64>,
    pub spent_transactions: Vec<String>,
}

/// The ledger: ordered blocks, validator registry, and the C3/C4 state
/// (owned via [`DoubleSpendDetector`]) plus a [`Mempool`] for pending
/// transactions.
pub struct Chain {
    blocks: Vec<Block>,
    config: Config,
    genesis: GenesisConfig,
    detector: DoubleSpendDetector,
    mempool: Mempool,
    validators: HashMap<Address, ValidatorInfo>,
    address_book: AddressBook,
    total_supply: Amount,
    metrics: Arc<dyn MetricsSink>,
}

impl Chain {
    /// Builds a fresh chain from `genesis`, applying its coinbase
    /// transaction as block 0.
    pub fn new(config: Config, genesis: GenesisConfig, address_book: AddressBook) -> Self {
        Self::with_metrics(config, genesis, address_book, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(
        config: Config,
        genesis: GenesisConfig,
        address_book: AddressBook,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let genesis_block = Block::new(
            0,
            ZERO_HASH.to_string(),
            genesis.timestamp,
            vec![genesis.coinbase.clone()],
            Address::coinbase(),
            genesis.nonce,
        );

        let mut detector = DoubleSpendDetector::new();
        let coinbase_amount = genesis.coinbase.amount;
        detector.utxo.add_utxo(
            genesis.coinbase.hash(),
            coinbase_amount,
            &genesis.coinbase.recipient,
            0,
            genesis.timestamp,
        );

        let mempool = Mempool::new(MempoolConfig {
            max_bytes: config.max_mempool_size,
            expiry_default: config.mempool_expiry_default,
            expiry_low_fee: config.mempool_expiry_low_fee,
            expiry_suspicious: config.mempool_expiry_suspicious,
        });

        Self {
            blocks: vec![genesis_block],
            config,
            genesis,
            detector,
            mempool,
            validators: HashMap::new(),
            address_book,
            total_supply: coinbase_amount,
            metrics,
        }
    }

    pub fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("genesis always present")
    }

    pub fn address_book_mut(&mut self) -> &mut AddressBook {
        &mut self.address_book
    }

    /// Admits a transaction into the mempool (does not apply it to chain
    /// state). System-only transaction types are rejected outright.
    pub fn add_transaction(&mut self, tx: Transaction, now: u64) -> Result<()> {
        if tx.tx_type.is_system_only() {
            return Err(Error::Unauthorized);
        }
        if !tx.verify(&self.address_book) {
            return Err(Error::BadSignature);
        }
        let view = ChainStateView { detector: &self.detector };
        self.mempool.add(tx.clone(), &view, now)?;
        self.metrics.transaction_admitted(tx.hash());
        Ok(())
    }

    /// Reward for `height`, honoring the distribution phase, halving
    /// schedule, and the `min_reward` floor.
    pub fn calculate_reward(&self, height: u64) -> Amount {
        if height < self.config.distribution_blocks {
            return self.config.distribution_reward;
        }
        let halvings = height / self.config.halving_interval;
        if halvings >= 63 {
            return self.config.min_reward;
        }
        let reward = self
            .config
            .initial_block_reward
            .div_round_down(1i128 << halvings);
        reward.max(self.config.min_reward)
    }

    /// Applies `candidate` — validated first (per the grounded reference
    /// implementation, against the transaction set as submitted), then a
    /// REWARD transaction is prepended crediting `validator`. Outside the
    /// distribution phase the validator must already be registered.
    pub fn add_block(&mut self, mut candidate: Block, validator: &Address, now: u64) -> Result<()> {
        candidate.is_valid(&self.genesis.hash, &self.address_book)?;
        if candidate.previous_hash != self.tip().hash {
            return Err(Error::Conflict);
        }

        let height = self.blocks.len() as u64;
        let distribution_phase = height < self.config.distribution_blocks;
        if !distribution_phase && !self.validators.contains_key(validator) {
            return Err(Error::Unauthorized);
        }
        let reward = self.calculate_reward(height);

        if reward.is_positive() {
            let reward_tx = Transaction::new(NewTransaction {
                sender: Address::coinbase(),
                recipient: validator.clone(),
                amount: reward,
                fee: Amount::SATOSHI,
                nonce: 0,
                expiry: crate::transaction::MAX_EXPIRY_SECS,
                network: self.config.network_type,
                tx_type: TransactionType::Reward,
                payload: None,
                timestamp: Some(candidate.timestamp),
            })?;
            candidate.transactions.insert(0, reward_tx);
            self.total_supply = self.total_supply.checked_add(reward)?;
        }

        for tx in candidate.transactions.clone() {
            self.detector.process(&tx, height, now, Some(validator))?;
            self.mempool.remove(tx.hash());
        }

        if !distribution_phase && reward.is_positive() {
            if let Some(info) = self.validators.get_mut(validator) {
                info.stake = info.stake.checked_add(reward)?;
                info.blocks_produced += 1;
                info.last_block_time = candidate.timestamp;
            }
        }

        self.detector.utxo.update_confirmations(height);
        self.metrics.block_applied(height, candidate.transactions.len());
        info!(height, validator = %validator, reward = %reward, "block_added");
        self.blocks.push(candidate);
        Ok(())
    }

    /// Minimum stake, unique address, sufficient balance, initial
    /// reputation 100.
    pub fn register_validator(&mut self, address: &Address, stake: Amount, now: u64) -> Result<()> {
        if stake < self.config.min_stake {
            return Err(Error::InvalidFormat("stake below minimum".into()));
        }
        if self.validators.contains_key(address) {
            return Err(Error::Conflict);
        }
        if self.detector.utxo.balance(address) < stake {
            return Err(Error::InsufficientFunds {
                have: self.detector.utxo.balance(address).to_string(),
                need: stake.to_string(),
            });
        }
        self.validators.insert(
            address.clone(),
            ValidatorInfo {
                stake,
                registered_at: now,
                status: ValidatorStatus::Active,
                blocks_produced: 0,
                last_block_time: 0,
                reputation: 100,
            },
        );
        Ok(())
    }

    pub fn validators(&self) -> &HashMap<Address, ValidatorInfo> {
        &self.validators
    }

    pub fn get_balance(&self, address: &Address) -> Amount {
        self.detector.utxo.balance(address)
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    pub fn get_transaction_by_hash(&self, hash: &str) -> Option<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|t| t.hash() == hash)
    }

    /// Looks a transaction up across the mempool and chain, classifying its
    /// finality tier per §4.8.
    pub fn get_transaction_with_finality(&self, hash: &str) -> Option<TxLookup> {
        if self.mempool.contains(hash) {
            if let Some(entry) = self.mempool_entry(hash) {
                return Some(TxLookup::Pending(entry));
            }
        }
        let current_height = self.blocks.len() as u64;
        for (i, block) in self.blocks.iter().enumerate() {
            for tx in &block.transactions {
                if tx.hash() == hash {
                    let confirmations = current_height - i as u64 - 1;
                    return Some(TxLookup::InChain {
                        transaction: tx.clone(),
                        block_height: i as u64,
                        confirmations,
                        finality: self.detector.finality_tier(confirmations),
                    });
                }
            }
        }
        None
    }

    fn mempool_entry(&self, hash: &str) -> Option<Transaction> {
        self.mempool.top(usize::MAX).into_iter().find(|t| t.hash() == hash)
    }

    /// Accepts a longer, independently valid competing chain, rebuilding
    /// C3/C4 from it and re-admitting abandoned non-coinbase transactions
    /// to the mempool.
    pub fn resolve_fork(&mut self, competing: Vec<Block>, now: u64) -> Result<()> {
        if competing.len() <= self.blocks.len() {
            return Ok(());
        }
        let Some(first) = competing.first() else {
            return Ok(());
        };
        if first.index != 0 || first.hash != self.genesis.hash {
            return Err(Error::Conflict);
        }
        for pair in competing.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.index != prev.index + 1 || next.previous_hash != prev.hash {
                return Err(Error::Conflict);
            }
        }

        let mut rebuilt = DoubleSpendDetector::new();
        let mut running_height = 0u64;
        for block in &competing {
            block.is_valid(&self.genesis.hash, &self.address_book)?;
            for tx in &block.transactions {
                rebuilt
                    .process(tx, running_height, now, Some(&block.validator))
                    .map_err(|_| Error::StateCorruption("competing chain failed replay".into()))?;
            }
            running_height += 1;
        }

        let old_blocks = std::mem::replace(&mut self.blocks, competing);
        let new_hashes: std::collections::HashSet<&str> = self
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(|t| t.hash())
            .collect();

        let reverted = old_blocks.len();
        for block in old_blocks {
            for tx in block.transactions {
                if tx.sender.is_coinbase() || new_hashes.contains(tx.hash()) {
                    continue;
                }
                let _ = self.add_transaction(tx, now);
            }
        }

        self.detector = rebuilt;
        self.metrics.fork_resolved(self.blocks.len() as u64, reverted);
        warn!(new_height = self.blocks.len(), "fork_resolved");
        Ok(())
    }

    pub fn export_state(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks.clone(),
            pending_transactions: self.mempool.top(usize::MAX),
            validator_set: self.validators.clone(),
            target_block_time: self.config.target_block_time,
            max_supply: self.config.max_supply,
            initial_block_reward: self.config.initial_block_reward,
            halving_period: self.config.halving_period,
            halving_interval: self.config.halving_interval,
            min_reward: self.config.min_reward,
            distribution_blocks: self.config.distribution_blocks,
            distribution_reward: self.config.distribution_reward,
            developer_reward: self.config.developer_reward,
            early_validator_reward: self.config.early_validator_reward,
            nonce_tracker: HashMap::new(),
            spent_transactions: Vec::new(),
        }
    }

    pub fn import_state(config: Config, genesis: GenesisConfig, address_book: AddressBook, snapshot: ChainSnapshot) -> Result<Self> {
        let mut chain = Self::new(config, genesis, address_book);
        chain.blocks = snapshot.blocks;
        chain.validators = snapshot.validator_set;
        for block in chain.blocks.clone().into_iter().skip(1) {
            for tx in &block.transactions {
                chain
                    .detector
                    .process(tx, block.index, tx.timestamp, Some(&block.validator))
                    .map_err(|e| Error::StateCorruption(format!("import replay failed: {e}")))?;
            }
        }
        Ok(chain)
    }
}

struct ChainStateView<'a> {
    detector: &'a DoubleSpendDetector,
}

impl ChainView for ChainStateView<'_> {
    fn expected_nonce(&self, address: &Address) -> u64 {
        self.detector.replay.expected_nonce(address)
    }
    fn is_spent(&self, hash: &str) -> bool {
        self.detector.replay.is_spent(hash)
    }
}
