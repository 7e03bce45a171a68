//! Block (C7): header, Merkle root, hashing, validator signature, and
//! structural validity.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::address::{Address, AddressBook};
use crate::crypto::{self, KeyPair};
use crate::error::{Error, Result};
use crate::transaction::Transaction;

/// Merkle root / previous-hash placeholder for an empty transaction list or
/// the chain's root block.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A block in the BT2C ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub validator: Address,
    pub nonce: u64,
    pub merkle_root: String,
    pub hash: String,
    pub signature: Option<String>,
}

impl Block {
    /// Builds a block, computing its Merkle root and hash. Does not sign:
    /// callers invoke [`Block::sign`] once the validator keypair is
    /// available (or skip it for genesis, which carries no signature).
    pub fn new(
        index: u64,
        previous_hash: String,
        timestamp: u64,
        transactions: Vec<Transaction>,
        validator: Address,
        nonce: u64,
    ) -> Self {
        let merkle_root = Self::calculate_merkle_root(&transactions);
        let mut block = Block {
            index,
            previous_hash,
            timestamp,
            transactions,
            validator,
            nonce,
            merkle_root,
            hash: String::new(),
            signature: None,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// sha256 of the concatenated transaction hashes, in order; `ZERO_HASH`
    /// if the block carries no transactions.
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        if transactions.is_empty() {
            return ZERO_HASH.to_string();
        }
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.hash().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Canonical header dict used both as the hash and signing preimage:
    /// sorted keys, transactions as their own canonical JSON, `hash` and
    /// `signature` excluded.
    fn canonical_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("index".into(), Value::Number(self.index.into()));
        map.insert(
            "previous_hash".into(),
            Value::String(self.previous_hash.clone()),
        );
        map.insert("timestamp".into(), Value::Number(self.timestamp.into()));
        let txs: Vec<Value> = self.transactions.iter().map(|t| t.canonical_value()).collect();
        map.insert("transactions".into(), Value::Array(txs));
        map.insert(
            "validator".into(),
            Value::String(self.validator.as_str().to_string()),
        );
        map.insert("nonce".into(), Value::Number(self.nonce.into()));
        map.insert("merkle_root".into(), Value::String(self.merkle_root.clone()));
        Value::Object(map)
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.canonical_value()).expect("canonical value always serializes")
    }

    /// sha256 of the canonical header serialization, including the
    /// already-computed Merkle root.
    pub fn calculate_hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }

    pub fn sign(&mut self, keypair: &KeyPair) {
        let preimage = self.canonical_bytes();
        let signature = keypair.sign(&preimage);
        self.signature = Some(BASE64.encode(signature.to_bytes()));
    }

    fn decode_signature(&self) -> Option<Signature> {
        let raw = self.signature.as_ref()?;
        let bytes = BASE64.decode(raw).ok()?;
        Signature::from_bytes(&bytes).ok()
    }

    pub fn verify(&self, address_book: &AddressBook) -> bool {
        let Some(public_key) = address_book.resolve(&self.validator) else {
            return false;
        };
        let Some(signature) = self.decode_signature() else {
            return false;
        };
        crypto::verify(&public_key, &self.canonical_bytes(), &signature)
    }

    /// Full structural validity check. Genesis (`index == 0`) is accepted
    /// solely by matching `genesis_hash`; every other block must recompute
    /// to its stored Merkle root and hash, contain only individually valid
    /// transactions, and carry a validator signature that verifies.
    pub fn is_valid(&self, genesis_hash: &str, address_book: &AddressBook) -> Result<()> {
        if self.index == 0 {
            if self.hash == genesis_hash {
                return Ok(());
            }
            return Err(Error::IntegrityFailure);
        }

        if Self::calculate_merkle_root(&self.transactions) != self.merkle_root {
            return Err(Error::IntegrityFailure);
        }
        if self.calculate_hash() != self.hash {
            return Err(Error::IntegrityFailure);
        }
        for tx in &self.transactions {
            if !tx.verify(address_book) {
                return Err(Error::BadSignature);
            }
        }
        if !self.verify(address_book) {
            return Err(Error::BadSignature);
        }
        Ok(())
    }
}
