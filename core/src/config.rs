//! Consensus and runtime configuration for **BT2C** core.
//!
//! [`Config`] centralises the tunables enumerated in the system design
//! (target block time, mempool limits, stake minimums, halving schedule). It
//! is constructed via [`ConfigBuilder`] using the fluent builder pattern, so
//! callers can customise only the fields they care about while keeping
//! sensible defaults.
//!
//! [`GenesisConfig`] is the separate, per-network description of the
//! hardcoded genesis block: its hash is network-specific and checked
//! structurally by [`crate::block::Block::is_valid`].

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::transaction::Transaction;

/// Which BT2C network a node is participating in. Selects the genesis block
/// and, in principle, peer discovery seeds (outside this crate's scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    Testnet,
    Devnet,
}

impl NetworkType {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            NetworkType::Mainnet => "mainnet",
            NetworkType::Testnet => "testnet",
            NetworkType::Devnet => "devnet",
        }
    }
}

/// Runtime configuration shared across the crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Which network this node follows.
    pub network_type: NetworkType,

    /// Lower bound on block production cadence, in seconds.
    pub target_block_time: u64,

    /// Mempool byte cap before eviction kicks in.
    pub max_mempool_size: u64,

    /// Default mempool eviction horizon, in seconds.
    pub mempool_expiry_default: u64,
    /// Eviction horizon for bottom-quartile fee-rate entries.
    pub mempool_expiry_low_fee: u64,
    /// Eviction horizon for entries flagged suspicious.
    pub mempool_expiry_suspicious: u64,

    /// Minimum stake required to register as a validator.
    pub min_stake: Amount,

    /// Number of blocks during which `distribution_reward` is paid instead
    /// of the halving schedule, and validator registration is not required.
    pub distribution_blocks: u64,
    /// Fixed per-block reward during the distribution phase.
    pub distribution_reward: Amount,
    /// One-off reward seeding the developer address at genesis.
    pub developer_reward: Amount,
    /// Reward granted to validators that register during the distribution
    /// phase.
    pub early_validator_reward: Amount,

    /// Seconds between reward halvings (4 years by default).
    pub halving_period: u64,
    /// Blocks between reward halvings, derived from `halving_period` and
    /// `target_block_time` unless explicitly overridden.
    pub halving_interval: u64,

    /// Starting block subsidy before any halving.
    pub initial_block_reward: Amount,
    /// Reward floor; halving never drives it below this.
    pub min_reward: Amount,
    /// Maximum coin supply.
    pub max_supply: Amount,
}

impl Config {
    fn defaults_for(network_type: NetworkType) -> Self {
        let target_block_time = 300;
        let halving_period = 126_144_000; // 4 years
        Self {
            network_type,
            target_block_time,
            max_mempool_size: 100 * 1024 * 1024,
            mempool_expiry_default: 86_400,
            mempool_expiry_low_fee: 3_600,
            mempool_expiry_suspicious: 600,
            min_stake: Amount::from_whole(1),
            distribution_blocks: (14 * 86_400) / target_block_time,
            distribution_reward: Amount::from_whole(1),
            developer_reward: Amount::from_whole(1000),
            early_validator_reward: Amount::from_whole(1),
            halving_period,
            halving_interval: halving_period / target_block_time,
            initial_block_reward: Amount::parse("21.0").unwrap(),
            min_reward: Amount::SATOSHI,
            max_supply: Amount::from_whole(21_000_000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults_for(NetworkType::Mainnet)
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with defaults for `network_type`.
    pub fn new(network_type: NetworkType) -> Self {
        Self {
            inner: Config::defaults_for(network_type),
        }
    }

    pub fn target_block_time(mut self, secs: u64) -> Self {
        self.inner.target_block_time = secs;
        self
    }

    pub fn max_mempool_size(mut self, bytes: u64) -> Self {
        self.inner.max_mempool_size = bytes;
        self
    }

    pub fn min_stake(mut self, amount: Amount) -> Self {
        self.inner.min_stake = amount;
        self
    }

    pub fn distribution_blocks(mut self, blocks: u64) -> Self {
        self.inner.distribution_blocks = blocks;
        self
    }

    pub fn distribution_reward(mut self, amount: Amount) -> Self {
        self.inner.distribution_reward = amount;
        self
    }

    pub fn developer_reward(mut self, amount: Amount) -> Self {
        self.inner.developer_reward = amount;
        self
    }

    pub fn early_validator_reward(mut self, amount: Amount) -> Self {
        self.inner.early_validator_reward = amount;
        self
    }

    pub fn halving_period(mut self, secs: u64) -> Self {
        self.inner.halving_period = secs;
        self.inner.halving_interval = secs / self.inner.target_block_time.max(1);
        self
    }

    /// Consumes the builder, returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

/// Hardcoded description of a network's genesis block. `hash` is compared
/// structurally against a freshly constructed genesis block by
/// [`crate::block::Block::is_valid`]; it is the one block whose validity
/// does not derive from chain linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub network_type: NetworkType,
    pub timestamp: u64,
    pub nonce: u64,
    pub hash: String,
    /// The coinbase transaction seeding the developer address.
    pub coinbase: Transaction,
    pub distribution_blocks: u64,
    pub distribution_reward: Amount,
    pub early_validator_reward: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new(NetworkType::Testnet)
            .target_block_time(60)
            .min_stake(Amount::from_whole(5))
            .finish();
        assert_eq!(cfg.target_block_time, 60);
        assert_eq!(cfg.min_stake, Amount::from_whole(5));
        assert_eq!(cfg.network_type, NetworkType::Testnet);
    }

    #[test]
    fn default_halving_interval_matches_four_year_period() {
        let cfg = Config::default();
        assert_eq!(cfg.halving_interval, 126_144_000 / 300);
    }
}
