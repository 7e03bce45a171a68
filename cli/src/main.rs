//! `bt2c` command-line entry point: thin glue between `bt2c-wallet`,
//! `bt2c-rpc`, `bt2c-network`, and `bt2c-core`. Holds no consensus logic of
//! its own.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};

use bt2c_core::address::{Address, AddressBook};
use bt2c_core::amount::Amount;
use bt2c_core::block::{Block, ZERO_HASH};
use bt2c_core::chain::Chain;
use bt2c_core::config::{Config, GenesisConfig, NetworkType};
use bt2c_core::crypto::KeyPair;
use bt2c_core::transaction::{NewTransaction, Transaction, TransactionType};
use bt2c_network::{GossipRelay, PeerIdentity};
use bt2c_wallet::Wallet;

#[derive(Parser)]
#[command(name = "bt2c")]
#[command(about = "BT2C node and wallet CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node: binds the RPC server and a local gossip relay.
    Node {
        #[arg(long, default_value = "127.0.0.1:9944")]
        rpc_addr: String,
    },
    /// Create a new encrypted wallet file.
    WalletCreate {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        file: String,
        /// Passed on the command line for this demo CLI only; a
        /// production-facing build should read this from a terminal
        /// prompt or an OS keychain instead.
        #[arg(long)]
        password: String,
        #[arg(long)]
        seed_phrase: Option<String>,
    },
    /// Print the address recorded in a wallet file.
    WalletAddress {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        file: String,
        #[arg(long)]
        password: String,
    },
    /// Build, sign, and admit a transaction against a fresh in-memory demo
    /// chain (no persistence — for exercising the submission path only).
    TxSubmit {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        file: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "0.00000001")]
        fee: String,
        #[arg(long, default_value_t = 0)]
        nonce: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Node { rpc_addr } => run_node(&rpc_addr),
        Commands::WalletCreate {
            dir,
            file,
            password,
            seed_phrase,
        } => wallet_create(&dir, &file, &password, seed_phrase),
        Commands::WalletAddress { dir, file, password } => wallet_address(&dir, &file, &password),
        Commands::TxSubmit {
            dir,
            file,
            password,
            to,
            amount,
            fee,
            nonce,
        } => tx_submit(&dir, &file, &password, &to, &amount, &fee, nonce),
    }
}

fn run_node(rpc_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let identity = PeerIdentity::generate();
        tracing::info!(peer_id = %identity.peer_id(), "node_identity");
        let _relay = GossipRelay::default();

        let chain = Arc::new(Mutex::new(demo_chain()));
        let handle = bt2c_rpc::serve(chain, rpc_addr).await?;
        tracing::info!(rpc_addr, "rpc_server_started");

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting_down");
        handle.stop()?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn wallet_create(
    dir: &PathBuf,
    file: &str,
    password: &str,
    seed_phrase: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let wallet = Wallet::generate(seed_phrase, now_secs())?;
    let path = wallet.save(dir, file, password)?;
    println!("address: {}", wallet.address());
    if let Some(phrase) = wallet.seed_phrase() {
        println!("seed phrase (record this, it is not stored on disk in the wallet file): {phrase}");
    }
    println!("wallet written to {}", path.display());
    Ok(())
}

fn wallet_address(dir: &PathBuf, file: &str, password: &str) -> Result<(), Box<dyn std::error::Error>> {
    let wallet = Wallet::load(dir, file, password)?;
    println!("{}", wallet.address());
    Ok(())
}

fn tx_submit(
    dir: &PathBuf,
    file: &str,
    password: &str,
    to: &str,
    amount: &str,
    fee: &str,
    nonce: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let wallet = Wallet::load(dir, file, password)?;
    let mut tx = Transaction::new(NewTransaction {
        sender: wallet.address().clone(),
        recipient: Address::from(to.to_string()),
        amount: Amount::parse(amount)?,
        fee: Amount::parse(fee)?,
        nonce,
        expiry: 3600,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Transfer,
        payload: None,
        timestamp: Some(now_secs()),
    })?;
    tx.sign(wallet.keypair());

    let mut chain = demo_chain();
    *chain.address_book_mut() = {
        let mut book = AddressBook::new();
        book.register(wallet.keypair().public_key());
        book
    };
    chain.add_transaction(tx.clone(), now_secs())?;
    println!("admitted {} to mempool", tx.hash());
    Ok(())
}

/// A throwaway genesis/chain for demo commands that don't yet have a
/// persisted node to talk to. Real deployments load a network's fixed
/// genesis from configuration instead of generating one per invocation.
fn demo_chain() -> Chain {
    let kp = KeyPair::from_mnemonic(
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
    )
    .expect("fixed demo mnemonic is valid");
    let developer = Address::from_public_key(&kp.public_key());
    let mut book = AddressBook::new();
    book.register(kp.public_key());

    let coinbase = Transaction::new(NewTransaction {
        sender: Address::coinbase(),
        recipient: developer,
        amount: Amount::from_whole(1000),
        fee: Amount::SATOSHI,
        nonce: 0,
        expiry: 86_400,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Developer,
        payload: None,
        timestamp: Some(1_000),
    })
    .expect("fixed demo coinbase transaction is valid");
    let genesis_block = Block::new(0, ZERO_HASH.to_string(), 1_000, vec![coinbase.clone()], Address::coinbase(), 0);

    let genesis = GenesisConfig {
        network_type: NetworkType::Testnet,
        timestamp: 1_000,
        nonce: 0,
        hash: genesis_block.hash,
        coinbase,
        distribution_blocks: 10_000,
        distribution_reward: Amount::from_whole(1),
        early_validator_reward: Amount::from_whole(1),
    };
    Chain::new(Config::default(), genesis, book)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
