//! Thin peer-gossip collaborator for `bt2c-core` (§6 External Interfaces).
//!
//! The wire protocol for gossip is explicitly out of scope (§1 Non-goals):
//! this crate defines the message envelope a transport carries and a peer
//! identity built on `libp2p`'s keypair/`PeerId`, and relays messages
//! in-process via a broadcast channel. A production deployment would swap
//! [`GossipRelay`] for real `libp2p` `gossipsub`/`kad` wiring without
//! touching `bt2c-core` or the message shapes below.

use libp2p::identity::Keypair;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use bt2c_core::block::Block;
use bt2c_core::transaction::Transaction;

/// Everything a peer gossips: new transactions for the mempool, and new
/// blocks for chain extension/fork resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Transaction(Transaction),
    Block(Block),
}

/// A node's libp2p identity. Generated fresh per process unless persisted
/// by the caller (`cli` owns that decision; this crate doesn't).
pub struct PeerIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl PeerIdentity {
    pub fn generate() -> Self {
        let keypair = Keypair::generate_ed25519();
        let peer_id = PeerId::from(keypair.public());
        Self { keypair, peer_id }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

/// In-process gossip relay: every [`GossipMessage`] sent on one handle is
/// observed by every other handle's receiver. Stands in for the transport
/// layer a real deployment would run over `libp2p` gossipsub.
#[derive(Clone)]
pub struct GossipRelay {
    sender: broadcast::Sender<GossipMessage>,
}

impl GossipRelay {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, message: GossipMessage) {
        // No subscribers is a normal idle state, not an error.
        let _ = self.sender.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GossipMessage> {
        self.sender.subscribe()
    }
}

impl Default for GossipRelay {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt2c_core::address::Address;
    use bt2c_core::amount::Amount;
    use bt2c_core::config::NetworkType;
    use bt2c_core::transaction::{NewTransaction, TransactionType};

    fn sample_tx() -> Transaction {
        Transaction::new(NewTransaction {
            sender: Address::coinbase(),
            recipient: "bt2c_recipient".into(),
            amount: Amount::from_whole(1),
            fee: Amount::SATOSHI,
            nonce: 0,
            expiry: 3600,
            network: NetworkType::Testnet,
            tx_type: TransactionType::Reward,
            payload: None,
            timestamp: Some(1_000),
        })
        .unwrap()
    }

    #[test]
    fn peer_identity_peer_id_matches_keypair() {
        let identity = PeerIdentity::generate();
        assert_eq!(identity.peer_id(), PeerId::from(identity.keypair().public()));
    }

    #[tokio::test]
    async fn relay_delivers_published_message_to_subscriber() {
        let relay = GossipRelay::default();
        let mut rx = relay.subscribe();
        relay.publish(GossipMessage::Transaction(sample_tx()));

        match rx.recv().await.unwrap() {
            GossipMessage::Transaction(tx) => assert_eq!(tx.hash(), sample_tx().hash()),
            GossipMessage::Block(_) => panic!("expected a transaction message"),
        }
    }
}
