use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sender identifier used for mining rewards
pub const REWARD_SENDER: &str = "0";

/// Amount paid to the miner of every block
pub const MINING_REWARD: f64 = 1.0;

/// Represents a transfer recorded on the ledger
///
/// Sender and recipient are opaque identifiers; nothing is signed or checked
/// for solvency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender identifier
    pub sender: String,

    /// Recipient identifier
    pub recipient: String,

    /// Amount being transferred
    pub amount: f64,
}

impl Transaction {
    /// Creates a new transaction
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Creates the mining reward transaction paid to `miner`
    pub fn new_reward(miner: impl Into<String>) -> Self {
        Transaction::new(REWARD_SENDER, miner, MINING_REWARD)
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new("alice", "bob", 10.0);

        assert_eq!(transaction.sender, "alice");
        assert_eq!(transaction.recipient, "bob");
        assert_eq!(transaction.amount, 10.0);
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_reward_transaction() {
        let transaction = Transaction::new_reward("miner");

        assert_eq!(transaction.sender, "0");
        assert_eq!(transaction.recipient, "miner");
        assert_eq!(transaction.amount, 1.0);
        assert!(transaction.is_reward());
    }

    #[test]
    fn test_wire_format() {
        let transaction = Transaction::new("a", "b", 2.5);
        let json = serde_json::to_value(&transaction).unwrap();

        assert_eq!(json, serde_json::json!({"sender": "a", "recipient": "b", "amount": 2.5}));
    }
}
