// Blockchain module
//
// This module contains the ledger core:
// - Canonical hashing
// - Block and transaction structures
// - Proof of work
// - The ledger with its pending transaction pool
// - Chain validation
// - Peer registry and consensus resolution

pub mod block;
pub mod chain;
pub mod consensus;
pub mod crypto;
pub mod peers;
pub mod pool;
pub mod pow;
pub mod transaction;
pub mod validation;

// Re-export main components for easier access
pub use block::Block;
pub use chain::Ledger;
pub use peers::PeerRegistry;
pub use transaction::Transaction;
