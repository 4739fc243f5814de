// Proof-of-work ledger node
//
// - blockchain: hashing, proof of work, the ledger, validation and consensus
// - node: the node facade shared by the HTTP handlers
// - api: actix-web routes and handlers
// - config: environment-driven settings

pub mod api;
pub mod blockchain;
pub mod config;
pub mod node;
