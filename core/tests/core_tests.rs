//! Integration tests covering the ledger's cross-module testable properties:
//! halving math, double-spend/replay rejection, RBF, fork resolution, and
//! deterministic wallet addresses.

use bt2c_core::address::{Address, AddressBook};
use bt2c_core::amount::Amount;
use bt2c_core::block::{Block, ZERO_HASH};
use bt2c_core::chain::{Chain, TxLookup};
use bt2c_core::config::{Config, GenesisConfig, NetworkType};
use bt2c_core::crypto::KeyPair;
use bt2c_core::error::Error;
use bt2c_core::transaction::{NewTransaction, Transaction, TransactionType};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const OTHER_MNEMONIC: &str =
    "legal winner thank year wave sausage worth useful legal winner thank yellow";

fn genesis_chain(distribution_blocks: u64) -> (Chain, KeyPair, Address, AddressBook) {
    let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
    let developer = Address::from_public_key(&kp.public_key());
    let mut book = AddressBook::new();
    book.register(kp.public_key());

    let coinbase = Transaction::new(NewTransaction {
        sender: Address::coinbase(),
        recipient: developer.clone(),
        amount: Amount::from_whole(1000),
        fee: Amount::SATOSHI,
        nonce: 0,
        expiry: 86_400,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Developer,
        payload: None,
        timestamp: Some(1_000),
    })
    .unwrap();
    let genesis_block = Block::new(0, ZERO_HASH.to_string(), 1_000, vec![coinbase.clone()], Address::coinbase(), 0);

    let genesis = GenesisConfig {
        network_type: NetworkType::Testnet,
        timestamp: 1_000,
        nonce: 0,
        hash: genesis_block.hash,
        coinbase,
        distribution_blocks,
        distribution_reward: Amount::from_whole(1),
        early_validator_reward: Amount::from_whole(1),
    };

    let config = Config::default();
    let chain = Chain::new(config, genesis, book.clone());
    (chain, kp, developer, book)
}

#[test]
fn address_is_deterministic_for_a_given_mnemonic() {
    let a = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
    let b = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
    assert_eq!(
        Address::from_public_key(&a.public_key()),
        Address::from_public_key(&b.public_key())
    );
}

#[test]
fn distribution_phase_pays_fixed_reward_then_halves() {
    let (chain, _kp, _dev, _book) = genesis_chain(3);
    assert_eq!(chain.calculate_reward(0), Amount::from_whole(1));
    assert_eq!(chain.calculate_reward(2), Amount::from_whole(1));

    let halving_interval = Config::default().halving_interval;
    assert_eq!(chain.calculate_reward(halving_interval), Amount::parse("10.5").unwrap());
    assert_eq!(
        chain.calculate_reward(halving_interval * 2),
        Amount::parse("5.25").unwrap()
    );
}

#[test]
fn double_spend_across_blocks_is_rejected() {
    let (mut chain, kp, developer, mut book) = genesis_chain(10);
    let sender_kp = KeyPair::from_mnemonic(OTHER_MNEMONIC).unwrap();
    let sender = Address::from_public_key(&sender_kp.public_key());
    book.register(sender_kp.public_key());
    *chain.address_book_mut() = book;

    // fund `sender` directly via the developer's genesis balance through a block.
    let mut fund_tx = Transaction::new(NewTransaction {
        sender: developer.clone(),
        recipient: sender.clone(),
        amount: Amount::from_whole(100),
        fee: Amount::SATOSHI,
        nonce: 0,
        expiry: 3600,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Transfer,
        payload: None,
        timestamp: Some(2_000),
    })
    .unwrap();
    fund_tx.sign(&kp);
    let validator = developer.clone();
    let mut funding_block = Block::new(1, chain.tip().hash.clone(), 2_000, vec![fund_tx], validator.clone(), 0);
    funding_block.sign(&kp);
    chain.add_block(funding_block, &validator, 2_000).unwrap();
    assert_eq!(chain.get_balance(&sender), Amount::from_whole(100));

    // sender spends 90, leaving only 9.99999 behind; a second 90 spend must fail.
    let mut spend1 = Transaction::new(NewTransaction {
        sender: sender.clone(),
        recipient: developer.clone(),
        amount: Amount::from_whole(90),
        fee: Amount::SATOSHI,
        nonce: 0,
        expiry: 3600,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Transfer,
        payload: None,
        timestamp: Some(3_000),
    })
    .unwrap();
    spend1.sign(&sender_kp);
    let mut block2 = Block::new(2, chain.tip().hash.clone(), 3_000, vec![spend1], validator.clone(), 0);
    block2.sign(&kp);
    chain.add_block(block2, &validator, 3_000).unwrap();

    let mut spend2 = Transaction::new(NewTransaction {
        sender: sender.clone(),
        recipient: developer.clone(),
        amount: Amount::from_whole(9),
        fee: Amount::SATOSHI,
        nonce: 1,
        expiry: 3600,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Transfer,
        payload: None,
        timestamp: Some(4_000),
    })
    .unwrap();
    spend2.sign(&sender_kp);
    let mut block3 = Block::new(3, chain.tip().hash.clone(), 4_000, vec![spend2], validator.clone(), 0);
    block3.sign(&kp);
    let err = chain.add_block(block3, &validator, 4_000).unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));
}

#[test]
fn rejects_unauthorized_validator_outside_distribution_phase() {
    let (mut chain, kp, _developer, mut book) = genesis_chain(1);
    let validator = Address::from_public_key(&kp.public_key());
    let mut first = Block::new(1, chain.tip().hash.clone(), 2_000, vec![], validator.clone(), 0);
    first.sign(&kp);
    chain.add_block(first, &validator, 2_000).unwrap();

    let other_kp = KeyPair::from_mnemonic(OTHER_MNEMONIC).unwrap();
    let other = Address::from_public_key(&other_kp.public_key());
    book.register(other_kp.public_key());
    *chain.address_book_mut() = book;
    let mut second = Block::new(2, chain.tip().hash.clone(), 3_000, vec![], other.clone(), 0);
    second.sign(&other_kp);
    assert_eq!(chain.add_block(second, &other, 3_000), Err(Error::Unauthorized));
}

#[test]
fn resolve_fork_switches_to_longer_properly_linked_chain() {
    let (mut chain, kp, developer, _book) = genesis_chain(10);
    let validator = developer.clone();
    let genesis_block = chain.tip().clone();

    // Original chain: genesis -> block1, carrying a transfer the competing
    // chain never includes.
    let mut abandoned_tx = Transaction::new(NewTransaction {
        sender: developer.clone(),
        recipient: "bt2c_someone_else000000000".into(),
        amount: Amount::from_whole(5),
        fee: Amount::SATOSHI,
        nonce: 0,
        expiry: 3600,
        network: NetworkType::Testnet,
        tx_type: TransactionType::Transfer,
        payload: None,
        timestamp: Some(2_000),
    })
    .unwrap();
    abandoned_tx.sign(&kp);
    let abandoned_hash = abandoned_tx.hash().to_string();
    let mut block1 = Block::new(1, genesis_block.hash.clone(), 2_000, vec![abandoned_tx], validator.clone(), 0);
    block1.sign(&kp);
    chain.add_block(block1, &validator, 2_000).unwrap();
    assert_eq!(chain.height(), 1);

    // A properly linked competing chain, one block longer, that never
    // includes the abandoned transaction.
    let mut comp1 = Block::new(1, genesis_block.hash.clone(), 2_100, vec![], validator.clone(), 0);
    comp1.sign(&kp);
    let mut comp2 = Block::new(2, comp1.hash.clone(), 2_200, vec![], validator.clone(), 0);
    comp2.sign(&kp);
    chain
        .resolve_fork(vec![genesis_block, comp1, comp2.clone()], 2_300)
        .unwrap();

    assert_eq!(chain.height(), 2);
    assert_eq!(chain.tip().hash, comp2.hash);
    assert!(matches!(
        chain.get_transaction_with_finality(&abandoned_hash),
        Some(TxLookup::Pending(_))
    ));
}

#[test]
fn resolve_fork_rejects_chain_with_broken_previous_hash_link() {
    let (mut chain, kp, developer, _book) = genesis_chain(10);
    let validator = developer;
    let genesis_block = chain.tip().clone();

    // A longer candidate chain, but its second block does not actually
    // extend the first: previous_hash points nowhere in the candidate.
    let mut linked = Block::new(1, genesis_block.hash.clone(), 2_000, vec![], validator.clone(), 0);
    linked.sign(&kp);
    let mut disconnected = Block::new(2, "deadbeef".to_string(), 2_100, vec![], validator.clone(), 0);
    disconnected.sign(&kp);

    let err = chain
        .resolve_fork(vec![genesis_block, linked, disconnected], 2_200)
        .unwrap_err();
    assert_eq!(err, Error::Conflict);
    assert_eq!(chain.height(), 0);
}

#[test]
fn export_then_construct_matches_tunables() {
    let (chain, _kp, _dev, _book) = genesis_chain(5);
    let snapshot = chain.export_state();
    assert_eq!(snapshot.max_supply, Amount::from_whole(21_000_000));
    assert_eq!(snapshot.initial_block_reward, Amount::parse("21.0").unwrap());
    assert_eq!(snapshot.distribution_blocks, 5);
}
