use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_LENGTH;
use hyper::{Body, Client, Uri};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::Block;
use super::chain::Ledger;
use super::peers::PeerRegistry;
use super::validation::ChainValidator;

/// Default time a peer gets to answer a chain request
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on the size of a peer's chain response body
pub const DEFAULT_MAX_CHAIN_BYTES: usize = 16 * 1024 * 1024;

/// Errors that can occur while fetching a chain from a peer
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid peer URI: {0}")]
    InvalidUri(String),

    #[error("Transport error: {0}")]
    Transport(#[from] hyper::Error),

    #[error("Peer answered with status {0}")]
    Status(u16),

    #[error("Chain response exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Malformed chain response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Peer did not answer within {0:?}")]
    Timeout(Duration),
}

/// Chain exchange envelope served at `GET /chain`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the serving node considers its chain valid
    #[serde(default)]
    pub is_valid: bool,
}

/// Where the resolver gets peer chains from
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, FetchError>;
}

/// Fetches peer chains over HTTP from `http://{peer}/chain`
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    client: Client<HttpConnector, Body>,

    /// Responses larger than this are abandoned
    max_body_bytes: usize,
}

impl Default for HttpChainSource {
    fn default() -> Self {
        HttpChainSource::with_limit(DEFAULT_MAX_CHAIN_BYTES)
    }
}

impl HttpChainSource {
    /// Creates a source with the default response size cap
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that refuses chain responses over `max_body_bytes`
    pub fn with_limit(max_body_bytes: usize) -> Self {
        HttpChainSource {
            client: Client::new(),
            max_body_bytes,
        }
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, FetchError> {
        let uri: Uri = format!("http://{}/chain", peer)
            .parse()
            .map_err(|_| FetchError::InvalidUri(peer.to_string()))?;

        let response = self.client.get(uri).await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let limit = self.max_body_bytes;
        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        if declared.map_or(false, |length| length > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }

        // The header may be absent or wrong, so the cap is enforced while reading
        let mut body = response.into_body();
        let mut bytes = Vec::with_capacity(declared.map_or(0, |length| length as usize));
        while let Some(chunk) = body.data().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Outcome of a consensus round
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The local chain after resolution
    pub chain: Vec<Block>,
}

/// Longest-valid-chain consensus across registered peers
#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    validator: ChainValidator,
    timeout: Duration,
}

impl ConsensusResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    ///
    /// * `validator` - Checks every candidate chain before it can win
    /// * `timeout` - Time each peer gets to deliver its chain
    pub fn new(validator: ChainValidator, timeout: Duration) -> Self {
        ConsensusResolver { validator, timeout }
    }

    /// Gets the validator applied to peer chains
    pub fn validator(&self) -> &ChainValidator {
        &self.validator
    }

    /// Queries every peer concurrently and adopts the longest valid chain
    /// that is strictly longer than the local one
    ///
    /// Unreachable peers, error responses, timeouts and invalid chains only
    /// exclude the peer concerned; resolution itself never fails. Candidate
    /// chains are validated on the blocking thread pool.
    pub async fn resolve<S>(&self, ledger: &Ledger, peers: &PeerRegistry, source: &S) -> Resolution
    where
        S: ChainSource + ?Sized,
    {
        let members = peers.members();
        let fetches = members.iter().map(|peer| async move {
            let outcome = match tokio::time::timeout(self.timeout, source.fetch_chain(peer)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.timeout)),
            };
            (peer, outcome)
        });
        let responses = join_all(fetches).await;

        let mut best_length = ledger.len();
        let mut best_chain: Option<Vec<Block>> = None;

        // Responses come back in sorted peer order, so ties go to the
        // first peer and the pick does not depend on answer timing.
        for (peer, outcome) in responses {
            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    warn!("Skipping peer {}: {}", peer, err);
                    continue;
                }
            };

            if response.length != response.chain.len() {
                warn!(
                    "Skipping peer {}: reported length {} but sent {} blocks",
                    peer,
                    response.length,
                    response.chain.len()
                );
                continue;
            }

            if response.length <= best_length {
                continue;
            }

            let validator = self.validator;
            let chain = response.chain;
            let checked = tokio::task::spawn_blocking(move || {
                let verdict = validator.validate(&chain);
                (chain, verdict)
            })
            .await;

            let chain = match checked {
                Ok((chain, Ok(()))) => chain,
                Ok((_, Err(err))) => {
                    warn!("Skipping peer {}: invalid chain: {}", peer, err);
                    continue;
                }
                Err(err) => {
                    warn!("Skipping peer {}: validation task failed: {}", peer, err);
                    continue;
                }
            };

            best_length = response.length;
            best_chain = Some(chain);
        }

        let replaced = match best_chain {
            Some(chain) => {
                let replaced = ledger.replace_if_longer(chain);
                if replaced {
                    info!("Adopted peer chain of length {}", best_length);
                } else {
                    info!("Local chain grew during resolution, keeping it");
                }
                replaced
            }
            None => false,
        };

        Resolution {
            replaced,
            chain: ledger.chain(),
        }
    }
}

impl Default for ConsensusResolver {
    fn default() -> Self {
        ConsensusResolver::new(ChainValidator::default(), DEFAULT_PEER_TIMEOUT)
    }
}
