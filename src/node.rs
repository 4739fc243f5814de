use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::blockchain::chain::LedgerError;
use crate::blockchain::consensus::{
    ChainResponse, ChainSource, ConsensusResolver, HttpChainSource, Resolution,
};
use crate::blockchain::peers::{normalize_address, PeerError};
use crate::blockchain::pow::{CancelFlag, MiningError, ProofOfWork};
use crate::blockchain::validation::ChainValidator;
use crate::blockchain::{Block, Ledger, PeerRegistry, Transaction};
use crate::config::NodeConfig;

/// Errors reported by node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Missing values: {}", .0.join(", "))]
    MissingValues(Vec<&'static str>),

    #[error("Peer error: {0}")]
    PeerError(#[from] PeerError),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    #[error("System error: {0}")]
    SystemError(String),
}

impl NodeError {
    /// Whether the node is refusing work because it is shutting down
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeError::LedgerError(LedgerError::MiningError(MiningError::Cancelled)))
    }
}

/// A transaction as submitted by a client; every field is required
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionSubmission {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<f64>,
}

impl TransactionSubmission {
    /// Checks that every field is present
    pub fn into_transaction(self) -> Result<Transaction, NodeError> {
        match (self.sender, self.recipient, self.amount) {
            (Some(sender), Some(recipient), Some(amount)) => {
                Ok(Transaction::new(sender, recipient, amount))
            }
            (sender, recipient, amount) => {
                let mut missing = Vec::new();
                if sender.is_none() {
                    missing.push("sender");
                }
                if recipient.is_none() {
                    missing.push("recipient");
                }
                if amount.is_none() {
                    missing.push("amount");
                }
                Err(NodeError::MissingValues(missing))
            }
        }
    }
}

/// A ledger node: the local chain, its peers and the consensus machinery
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Node {
    id: String,
    ledger: Arc<Ledger>,
    peers: Arc<PeerRegistry>,
    resolver: ConsensusResolver,
    source: Arc<dyn ChainSource>,
    shutdown: CancelFlag,
}

impl Node {
    /// Creates a node from its configuration, fetching peer chains over HTTP
    pub fn from_config(config: &NodeConfig) -> Result<Self, NodeError> {
        let pow = ProofOfWork::new(config.difficulty);
        let resolver = ConsensusResolver::new(
            ChainValidator::new(pow, config.validation_mode),
            config.peer_timeout,
        );
        let id = config
            .node_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        info!("Validating peer chains in {:?} mode", resolver.validator().mode());

        let source = HttpChainSource::with_limit(config.max_chain_bytes);
        let node = Node::new(id, Ledger::new(pow), resolver, Arc::new(source));
        node.register_peers(config.peers.as_slice())?;
        Ok(node)
    }

    /// Creates a node around an existing ledger
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier credited with mining rewards
    /// * `ledger` - The local chain
    /// * `resolver` - Consensus settings
    /// * `source` - Where peer chains are fetched from
    pub fn new(
        id: String,
        ledger: Ledger,
        resolver: ConsensusResolver,
        source: Arc<dyn ChainSource>,
    ) -> Self {
        info!("Node {} starting with a fresh genesis block", id);
        Node {
            id,
            ledger: Arc::new(ledger),
            peers: Arc::new(PeerRegistry::new()),
            resolver,
            source,
            shutdown: CancelFlag::new(),
        }
    }

    /// Gets the identifier credited with mining rewards
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the local ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Mines a block crediting this node with the mining reward
    ///
    /// The proof search runs on the blocking thread pool.
    pub async fn mine(&self) -> Result<Block, NodeError> {
        let ledger = Arc::clone(&self.ledger);
        let miner = self.id.clone();
        let shutdown = self.shutdown.clone();

        let block = tokio::task::spawn_blocking(move || ledger.mine(&miner, &shutdown))
            .await
            .map_err(|e| NodeError::SystemError(e.to_string()))??;

        let transfers = block.transactions.iter().filter(|t| !t.is_reward()).count();
        info!("Node {} mined block {} carrying {} transfers", self.id, block.index, transfers);

        Ok(block)
    }

    /// Validates and pools a submitted transaction
    ///
    /// # Returns
    ///
    /// The index of the block expected to include it
    pub fn submit_transaction(&self, submission: TransactionSubmission) -> Result<u64, NodeError> {
        let transaction = submission.into_transaction()?;
        Ok(self.ledger.record_transaction(transaction))
    }

    /// Gets the transactions waiting for the next block
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.pending_transactions()
    }

    /// Gets the local chain wrapped in the chain exchange envelope
    ///
    /// The chain is validated on the blocking thread pool.
    pub async fn chain(&self) -> Result<ChainResponse, NodeError> {
        let chain = self.ledger.chain();
        let validator = *self.resolver.validator();

        let (chain, is_valid) = tokio::task::spawn_blocking(move || {
            let is_valid = validator.is_valid(&chain);
            (chain, is_valid)
        })
        .await
        .map_err(|e| NodeError::SystemError(e.to_string()))?;

        Ok(ChainResponse {
            length: chain.len(),
            chain,
            is_valid,
        })
    }

    /// Checks if the local chain passes validation
    pub async fn is_valid(&self) -> Result<bool, NodeError> {
        Ok(self.chain().await?.is_valid)
    }

    /// Registers peers; either all addresses are accepted or none is
    ///
    /// # Returns
    ///
    /// Every known peer after registration
    pub fn register_peers<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<String>, NodeError> {
        for address in addresses {
            normalize_address(address.as_ref())?;
        }
        for address in addresses {
            self.peers.register(address.as_ref())?;
        }
        Ok(self.peers.members())
    }

    /// Gets every registered peer, sorted
    pub fn peers(&self) -> Vec<String> {
        self.peers.members()
    }

    /// Gets the number of registered peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Runs consensus against every registered peer
    pub async fn resolve(&self) -> Resolution {
        self.resolver
            .resolve(&self.ledger, &self.peers, self.source.as_ref())
            .await
    }

    /// Aborts any running proof search and refuses new ones
    pub fn shutdown(&self) {
        info!("Node {} shutting down", self.id);
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::consensus::FetchError;
    use crate::blockchain::validation::ValidationMode;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Routes chain requests to other in-process nodes
    #[derive(Default)]
    struct InProcess {
        nodes: parking_lot::RwLock<HashMap<String, Node>>,
    }

    #[async_trait]
    impl ChainSource for InProcess {
        async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, FetchError> {
            let node = self.nodes.read().get(peer).cloned();
            match node {
                Some(node) => node.chain().await.map_err(|_| FetchError::Status(500)),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    fn node(id: &str, network: Arc<InProcess>) -> Node {
        let pow = ProofOfWork::new(2);
        let resolver = ConsensusResolver::new(
            ChainValidator::new(pow, ValidationMode::Full),
            Duration::from_secs(1),
        );
        Node::new(id.to_string(), Ledger::new(pow), resolver, network)
    }

    #[tokio::test]
    async fn test_mine_after_transaction() {
        let node = node("miner", Arc::default());
        let genesis = node.ledger().tip().unwrap();

        let index = node
            .submit_transaction(TransactionSubmission {
                sender: Some("A".to_string()),
                recipient: Some("B".to_string()),
                amount: Some(10.0),
            })
            .unwrap();
        assert_eq!(index, 2);

        let block = node.mine().await.unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(
            block.transactions,
            vec![Transaction::new("0", "miner", 1.0), Transaction::new("A", "B", 10.0)]
        );
        assert_eq!(block.previous_hash, genesis.calculate_hash());
        assert!(node.chain().await.unwrap().is_valid);
        assert!(node.is_valid().await.unwrap());
    }

    #[test]
    fn test_missing_amount_is_rejected() {
        let node = node("miner", Arc::default());

        let err = node
            .submit_transaction(TransactionSubmission {
                sender: Some("A".to_string()),
                recipient: Some("B".to_string()),
                amount: None,
            })
            .unwrap_err();

        assert!(matches!(err, NodeError::MissingValues(ref fields) if fields == &vec!["amount"]));
        assert!(node.pending_transactions().is_empty());
    }

    #[test]
    fn test_register_peers_all_or_nothing() {
        let node = node("n", Arc::default());

        assert!(node.register_peers(&["http://10.0.0.1:5000", "/bad"]).is_err());
        assert!(node.peers().is_empty());
        assert_eq!(node.peer_count(), 0);

        let peers = node
            .register_peers(&["http://10.0.0.1:5000", "10.0.0.2:5000", "http://10.0.0.1:5000"])
            .unwrap();
        assert_eq!(peers, vec!["10.0.0.1:5000", "10.0.0.2:5000"]);
        assert_eq!(node.peer_count(), 2);
    }

    #[tokio::test]
    async fn test_shorter_node_adopts_longer_chain() {
        let network = Arc::new(InProcess::default());
        let a = node("a", network.clone());
        let b = node("b", network.clone());
        network.nodes.write().insert("a:5000".to_string(), a.clone());
        network.nodes.write().insert("b:5000".to_string(), b.clone());

        a.mine().await.unwrap();
        b.mine().await.unwrap();
        b.mine().await.unwrap();

        a.register_peers(&["http://b:5000"]).unwrap();
        b.register_peers(&["http://a:5000"]).unwrap();

        let kept = b.resolve().await;
        assert!(!kept.replaced);

        let adopted = a.resolve().await;
        assert!(adopted.replaced);
        assert_eq!(adopted.chain, b.ledger().chain());
        assert_eq!(a.chain().await.unwrap().length, 3);
    }

    #[tokio::test]
    async fn test_mining_refused_after_shutdown() {
        let node = node("n", Arc::default());
        node.shutdown();

        let err = node.mine().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(node.ledger().len(), 1);
    }
}
