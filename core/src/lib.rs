//! BT2C ledger core.
//!
//! Consensus-critical components: crypto/address derivation, transactions,
//! replay protection, UTXO tracking, double-spend detection, the mempool,
//! blocks, and the chain that ties them together. `network`, `rpc`, and
//! `cli` are thin external collaborators built on top of this crate's
//! public API.

pub mod address;
pub mod amount;
pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod double_spend;
pub mod error;
pub mod mempool;
pub mod metrics;
pub mod replay;
pub mod transaction;
pub mod utxo;

pub use address::{Address, AddressBook};
pub use amount::Amount;
pub use block::Block;
pub use chain::Chain;
pub use config::{Config, ConfigBuilder, GenesisConfig, NetworkType};
pub use error::{Error, Result};
pub use mempool::Mempool;
pub use transaction::{Transaction, TransactionType};
