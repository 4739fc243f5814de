use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, Transaction};
use crate::node::{Node, NodeError, TransactionSubmission};

/// Data structure for the node state
pub type NodeData = web::Data<Node>;

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block expected to include this transaction
    pub block_index: u64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Index of the new block
    pub index: u64,

    /// Transactions sealed into the new block
    pub transactions: Vec<Transaction>,

    /// Proof of the new block
    pub proof: u64,

    /// Hash of the block it links to
    pub previous_hash: String,
}

/// Request for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peer addresses, e.g. `http://192.168.0.5:5000`
    pub nodes: Option<Vec<String>>,
}

/// Response for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesResponse {
    /// The message
    pub message: String,

    /// Every known peer
    pub total_nodes: Vec<String>,
}

/// Response for the consensus endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    /// The message
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The local chain after resolution
    pub new_chain: Vec<Block>,
}

fn error_response(err: &NodeError) -> HttpResponse {
    match err {
        NodeError::MissingValues(_) | NodeError::PeerError(_) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": err.to_string()
            }))
        }
        _ if err.is_cancelled() => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "Node is shutting down"
        })),
        _ => {
            error!("Request failed: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": err.to_string()
            }))
        }
    }
}

/// Get the full chain
///
/// Returns the entire chain, its length and its validity status
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = crate::blockchain::consensus::ChainResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    match node.chain().await {
        Ok(chain) => HttpResponse::Ok().json(chain),
        Err(err) => error_response(&err),
    }
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.pending_transactions())
}

/// Create a new transaction
///
/// Adds a new transaction to the pool of the next block
#[utoipa::path(
    post,
    path = "/transactions/new",
    request_body = TransactionSubmission,
    responses(
        (status = 201, description = "Transaction created successfully", body = TransactionResponse),
        (status = 400, description = "Missing values")
    )
)]
pub async fn new_transaction(
    node: NodeData,
    submission: web::Json<TransactionSubmission>,
) -> impl Responder {
    match node.submit_transaction(submission.into_inner()) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", block_index),
            block_index,
        }),
        Err(err) => error_response(&err),
    }
}

/// Mine a new block
///
/// Finds a proof for the current tip, pays the mining reward to this node
/// and seals all pending transactions into a new block
#[utoipa::path(
    get,
    path = "/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 503, description = "Node is shutting down"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    match node.mine().await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Forged".to_string(),
            index: block.index,
            transactions: block.transactions,
            proof: block.proof,
            previous_hash: block.previous_hash,
        }),
        Err(err) => error_response(&err),
    }
}

/// Check if the chain is valid
///
/// Validates the entire local chain
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    match node.is_valid().await {
        Ok(is_valid) => HttpResponse::Ok().json(is_valid),
        Err(err) => error_response(&err),
    }
}

/// Register peers
///
/// Adds one or more peers to consult during consensus
#[utoipa::path(
    post,
    path = "/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Peers registered", body = RegisterNodesResponse),
        (status = 400, description = "Missing or invalid peer addresses")
    )
)]
pub async fn register_nodes(
    node: NodeData,
    request: web::Json<RegisterNodesRequest>,
) -> impl Responder {
    let nodes = match request.into_inner().nodes {
        Some(nodes) => nodes,
        None => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Error: Please supply a valid list of nodes"
            }))
        }
    };

    match node.register_peers(nodes.as_slice()) {
        Ok(total_nodes) => HttpResponse::Created().json(RegisterNodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes,
        }),
        Err(err) => error_response(&err),
    }
}

/// Resolve conflicts
///
/// Replaces the local chain with the longest valid chain among peers
#[utoipa::path(
    get,
    path = "/nodes/resolve",
    responses(
        (status = 200, description = "Consensus finished", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    let resolution = node.resolve().await;
    let message = if resolution.replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced: resolution.replaced,
        new_chain: resolution.chain,
    })
}
