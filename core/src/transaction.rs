//! Transaction model (C2): canonical serialization, hashing, validation,
//! fee and expiry rules.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::address::{Address, AddressBook};
use crate::amount::Amount;
use crate::config::NetworkType;
use crate::crypto::{self, KeyPair};
use crate::error::{Error, Result};

/// Maximum transaction amount (1 billion BT2C), per the anti-overflow rule.
pub const MAX_AMOUNT: i128 = 1_000_000_000 * 100_000_000; // 1e9 whole * 1e8 units
/// Maximum transaction fee (1000 BT2C).
pub const MAX_FEE: i128 = 1_000 * 100_000_000;
pub const MIN_EXPIRY_SECS: u64 = 300;
pub const MAX_EXPIRY_SECS: u64 = 86_400;

/// The kind of effect a transaction has on chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Stake,
    Unstake,
    Validator,
    Reward,
    Developer,
}

impl TransactionType {
    pub fn wire_name(self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Stake => "stake",
            TransactionType::Unstake => "unstake",
            TransactionType::Validator => "validator",
            TransactionType::Reward => "reward",
            TransactionType::Developer => "developer",
        }
    }

    /// REWARD and DEVELOPER transactions may only originate from the chain
    /// itself (block production), never from mempool admission.
    pub fn is_system_only(self) -> bool {
        matches!(self, TransactionType::Reward | TransactionType::Developer)
    }
}

/// Fields supplied by a caller constructing a new transaction; `timestamp`
/// defaults to "now" and `hash`/`signature` are computed, not supplied.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
    pub fee: Amount,
    pub nonce: u64,
    pub expiry: u64,
    pub network: NetworkType,
    pub tx_type: TransactionType,
    pub payload: Option<BTreeMap<String, Value>>,
    /// Overrides the timestamp instead of using wall-clock "now"; intended
    /// for deterministic construction (genesis, tests, block production).
    pub timestamp: Option<u64>,
}

/// A transaction in the BT2C ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
    pub fee: Amount,
    pub nonce: u64,
    pub timestamp: u64,
    pub expiry: u64,
    pub network: NetworkType,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<BTreeMap<String, Value>>,
    pub signature: Option<String>,
    pub hash: Option<String>,
}

impl Transaction {
    /// Validates ranges, stamps the timestamp, and computes the hash.
    /// Does not sign: callers must call [`Transaction::sign`] separately,
    /// except for system-issued transactions the chain constructs itself.
    pub fn new(fields: NewTransaction) -> Result<Self> {
        let mut tx = Transaction {
            sender: fields.sender,
            recipient: fields.recipient,
            amount: fields.amount,
            fee: fields.fee,
            nonce: fields.nonce,
            timestamp: fields.timestamp.unwrap_or_else(now_secs),
            expiry: fields.expiry,
            network: fields.network,
            tx_type: fields.tx_type,
            payload: fields.payload,
            signature: None,
            hash: None,
        };
        tx.validate_ranges()?;
        tx.recompute_hash();
        Ok(tx)
    }

    fn validate_ranges(&self) -> Result<()> {
        if self.amount.units() <= 0 {
            return Err(Error::InvalidFormat("amount must be positive".into()));
        }
        if self.amount.units() > MAX_AMOUNT {
            return Err(Error::InvalidFormat("amount exceeds maximum".into()));
        }
        if self.fee.units() < Amount::SATOSHI.units() {
            return Err(Error::InvalidFormat("fee below minimum".into()));
        }
        if self.fee.units() > MAX_FEE {
            return Err(Error::InvalidFormat("fee exceeds maximum".into()));
        }
        if self.expiry < MIN_EXPIRY_SECS || self.expiry > MAX_EXPIRY_SECS {
            return Err(Error::InvalidFormat("expiry out of range".into()));
        }
        match self.tx_type {
            TransactionType::Stake => {
                if self.sender != self.recipient {
                    return Err(Error::InvalidFormat(
                        "stake transaction sender must equal recipient".into(),
                    ));
                }
                if self.amount.units() < Amount::from_whole(1).units() {
                    return Err(Error::InvalidFormat("stake amount below minimum".into()));
                }
            }
            TransactionType::Unstake => {
                let has_stake_id = self
                    .payload
                    .as_ref()
                    .map(|p| p.contains_key("stake_id"))
                    .unwrap_or(false);
                if !has_stake_id {
                    return Err(Error::InvalidFormat(
                        "unstake transaction missing stake_id payload".into(),
                    ));
                }
            }
            TransactionType::Validator => {
                let has_metadata = self.payload.as_ref().map(|p| !p.is_empty()).unwrap_or(false);
                if !has_metadata {
                    return Err(Error::InvalidFormat(
                        "validator transaction missing metadata payload".into(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Builds the canonical JSON value used both as the signing preimage and
    /// as the hash input: sorted keys, decimals as strings, enums as
    /// lowercase wire names, `payload` present only if set, `signature` and
    /// `hash` always excluded.
    pub fn canonical_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("sender".into(), Value::String(self.sender.as_str().to_string()));
        map.insert(
            "recipient".into(),
            Value::String(self.recipient.as_str().to_string()),
        );
        map.insert("amount".into(), Value::String(self.amount.to_string()));
        map.insert("fee".into(), Value::String(self.fee.to_string()));
        map.insert("nonce".into(), Value::Number(self.nonce.into()));
        map.insert("timestamp".into(), Value::Number(self.timestamp.into()));
        map.insert("expiry".into(), Value::Number(self.expiry.into()));
        map.insert(
            "network".into(),
            Value::String(self.network.as_wire_str().to_string()),
        );
        map.insert(
            "type".into(),
            Value::String(self.tx_type.wire_name().to_string()),
        );
        if let Some(payload) = &self.payload {
            let payload_map: serde_json::Map<String, Value> =
                payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            map.insert("payload".into(), Value::Object(payload_map));
        }
        Value::Object(map)
    }

    /// Canonical JSON bytes, excluding `signature`/`hash`, used for both
    /// hashing and signing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.canonical_value()).expect("canonical value always serializes")
    }

    fn recompute_hash(&mut self) {
        let digest = Sha256::digest(self.canonical_bytes());
        self.hash = Some(hex::encode(digest));
    }

    /// Size in bytes of the transaction's canonical serialization.
    pub fn size_bytes(&self) -> usize {
        self.canonical_bytes().len()
    }

    /// `max(1e-8, round_down_8(1e-8 * size / 250))`.
    pub fn calculate_fee(size_bytes: usize) -> Amount {
        let units = (size_bytes as i128) / 250;
        Amount::from_units(units.max(1))
    }

    /// Signs the transaction, computing the hash first if missing.
    /// Invalidates nothing else: the cached hash already excludes the
    /// signature, so re-signing never changes it.
    pub fn sign(&mut self, keypair: &KeyPair) {
        if self.hash.is_none() {
            self.recompute_hash();
        }
        let preimage = self.canonical_bytes();
        let signature = keypair.sign(&preimage);
        self.signature = Some(BASE64.encode(signature.to_bytes()));
    }

    /// `true` if the sender is the coinbase sentinel; otherwise verifies the
    /// signature against the sender's public key resolved from
    /// `address_book`. Coinbase transactions never carry a signature
    /// verification burden, matching consensus acceptance of
    /// system-generated reward/genesis transactions.
    pub fn verify(&self, address_book: &AddressBook) -> bool {
        if self.sender.is_coinbase() {
            return true;
        }
        let Some(public_key) = address_book.resolve(&self.sender) else {
            return false;
        };
        let Some(signature) = self.decode_signature() else {
            return false;
        };
        let preimage = self.canonical_bytes();
        crypto::verify(&public_key, &preimage, &signature)
    }

    fn decode_signature(&self) -> Option<Signature> {
        let raw = self.signature.as_ref()?;
        let bytes = BASE64.decode(raw).ok()?;
        Signature::from_bytes(&bytes).ok()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.timestamp + self.expiry
    }

    pub fn hash(&self) -> &str {
        self.hash.as_deref().unwrap_or_default()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn sample(kp: &KeyPair, nonce: u64) -> Transaction {
        let sender = Address::from_public_key(&kp.public_key());
        let recipient: Address = "bt2c_recipient00000000000000".into();
        Transaction::new(NewTransaction {
            sender,
            recipient,
            amount: Amount::from_whole(10),
            fee: Amount::from_units(100),
            nonce,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Transfer,
            payload: None,
            timestamp: Some(1_000_000),
        })
        .unwrap()
    }

    #[test]
    fn hash_excludes_signature_and_is_stable() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let mut tx = sample(&kp, 0);
        let hash_before = tx.hash().to_string();
        tx.sign(&kp);
        assert_eq!(tx.hash(), hash_before);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let mut tx = sample(&kp, 0);
        tx.sign(&kp);

        let mut book = AddressBook::new();
        book.register(kp.public_key());

        assert!(tx.verify(&book));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let mut tx = sample(&kp, 0);
        tx.sign(&kp);
        tx.amount = Amount::from_whole(999); // preimage changes, signature stale

        let mut book = AddressBook::new();
        book.register(kp.public_key());
        assert!(!tx.verify(&book));
    }

    #[test]
    fn coinbase_sender_verifies_unconditionally() {
        let tx = Transaction::new(NewTransaction {
            sender: Address::coinbase(),
            recipient: "bt2c_somebody00000000000000".into(),
            amount: Amount::from_whole(21),
            fee: Amount::SATOSHI,
            nonce: 0,
            expiry: 3600,
            network: NetworkType::Mainnet,
            tx_type: TransactionType::Reward,
            payload: None,
            timestamp: Some(1_000_000),
        })
        .unwrap();
        assert!(tx.verify(&AddressBook::new()));
    }

    #[test]
    fn rejects_out_of_range_amount() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let sender = Address::from_public_key(&kp.public_key());
        let result = Transaction::new(NewTransaction {
            sender,
            recipient: "bt2c_recipient00000000000000".into(),
            amount: Amount::ZERO,
            fee: Amount::SATOSHI,
            nonce: 0,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Transfer,
            payload: None,
            timestamp: Some(1_000_000),
        });
        assert!(result.is_err());
    }

    #[test]
    fn stake_requires_sender_equal_recipient() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let sender = Address::from_public_key(&kp.public_key());
        let result = Transaction::new(NewTransaction {
            sender: sender.clone(),
            recipient: "bt2c_someone_else000000000".into(),
            amount: Amount::from_whole(2),
            fee: Amount::SATOSHI,
            nonce: 0,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Stake,
            payload: None,
            timestamp: Some(1_000_000),
        });
        assert!(result.is_err());

        let ok = Transaction::new(NewTransaction {
            sender: sender.clone(),
            recipient: sender,
            amount: Amount::from_whole(2),
            fee: Amount::SATOSHI,
            nonce: 0,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Stake,
            payload: None,
            timestamp: Some(1_000_000),
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn expiry_check() {
        let kp = KeyPair::from_mnemonic(TEST_MNEMONIC).unwrap();
        let tx = sample(&kp, 0);
        assert!(!tx.is_expired(1_000_000 + 100));
        assert!(tx.is_expired(1_000_000 + 3601));
    }
}
