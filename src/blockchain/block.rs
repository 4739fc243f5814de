use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::crypto::{canonical_json, sha256_hex};
use super::transaction::Transaction;

/// Index of the genesis block
pub const GENESIS_INDEX: u64 = 1;

/// Proof stored in the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Placeholder `previous_hash` of the genesis block (not a real digest)
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Represents a block in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position of the block in the chain, starting at 1
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions sealed into this block, in pool order
    pub transactions: Vec<Transaction>,

    /// Proof of work linking this block to its predecessor
    pub proof: u64,

    /// Hash of the previous block
    pub previous_hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    pub fn new(index: u64, transactions: Vec<Transaction>, proof: u64, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Creates the genesis block
    pub fn genesis() -> Self {
        Block::new(
            GENESIS_INDEX,
            Vec::new(),
            GENESIS_PROOF,
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Calculates the hash of the block
    ///
    /// The block is rendered as canonical JSON (keys sorted at every level)
    /// and hashed with SHA-256.
    ///
    /// # Returns
    ///
    /// The hex-encoded digest, 64 characters long
    pub fn calculate_hash(&self) -> String {
        let block_data = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "proof": self.proof,
            "previous_hash": self.previous_hash,
        });

        sha256_hex(canonical_json(&block_data).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block() {
        let block = Block::genesis();

        assert_eq!(block.index, 1);
        assert_eq!(block.proof, 100);
        assert_eq!(block.previous_hash, "1");
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn test_calculate_hash() {
        let transactions = vec![Transaction::new_reward("miner"), Transaction::new("a", "b", 10.0)];
        let block = Block::new(2, transactions, 35293, "previous_hash".to_string());

        let hash = block.calculate_hash();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, block.calculate_hash());
    }

    #[test]
    fn test_hash_survives_wire_round_trip() {
        let block = Block::new(3, vec![Transaction::new("a", "b", 0.1)], 7, "prev".to_string());

        let wire = serde_json::to_string(&block).unwrap();
        let received: Block = serde_json::from_str(&wire).unwrap();

        assert_eq!(received, block);
        assert_eq!(received.calculate_hash(), block.calculate_hash());
    }

    #[test]
    fn test_hash_ignores_field_order_on_the_wire() {
        let block = Block::genesis();
        let reordered = format!(
            r#"{{"previous_hash":"1","proof":100,"transactions":[],"timestamp":{},"index":1}}"#,
            serde_json::to_string(&block.timestamp).unwrap()
        );

        let received: Block = serde_json::from_str(&reordered).unwrap();
        assert_eq!(received.calculate_hash(), block.calculate_hash());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let block = Block::new(2, Vec::new(), 1, "prev".to_string());
        let mut tampered = block.clone();
        tampered.proof = 2;

        assert_ne!(block.calculate_hash(), tampered.calculate_hash());
    }
}
