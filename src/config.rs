use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::blockchain::consensus::{DEFAULT_MAX_CHAIN_BYTES, DEFAULT_PEER_TIMEOUT};
use crate::blockchain::pow::DEFAULT_DIFFICULTY;
use crate::blockchain::validation::ValidationMode;

/// Errors raised while reading the node configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Node settings, read from the environment (and `.env` if present)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address the HTTP server binds to (`HOST`)
    pub host: String,

    /// Port the HTTP server binds to (`PORT`)
    pub port: u16,

    /// Leading hex zeros required by the proof of work (`MINING_DIFFICULTY`)
    pub difficulty: usize,

    /// Per-peer timeout during consensus (`PEER_TIMEOUT_SECS`)
    pub peer_timeout: Duration,

    /// Largest peer chain response accepted, in bytes (`MAX_CHAIN_BYTES`)
    pub max_chain_bytes: usize,

    /// Peers registered at startup (`PEERS`, comma separated)
    pub peers: Vec<String>,

    /// How peer chains are validated (`VALIDATION_MODE`)
    pub validation_mode: ValidationMode,

    /// Identifier credited with mining rewards (`NODE_ID`)
    pub node_id: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            difficulty: DEFAULT_DIFFICULTY,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            max_chain_bytes: DEFAULT_MAX_CHAIN_BYTES,
            peers: Vec::new(),
            validation_mode: ValidationMode::Full,
            node_id: None,
        }
    }
}

impl NodeConfig {
    /// Loads the configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = NodeConfig::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parse_or(&lookup, "PORT", defaults.port)?;
        let difficulty = parse_or(&lookup, "MINING_DIFFICULTY", defaults.difficulty)?;
        let peer_timeout = parse_or(&lookup, "PEER_TIMEOUT_SECS", defaults.peer_timeout.as_secs())
            .map(Duration::from_secs)?;
        let max_chain_bytes = parse_or(&lookup, "MAX_CHAIN_BYTES", defaults.max_chain_bytes)?;
        let validation_mode = parse_or(&lookup, "VALIDATION_MODE", defaults.validation_mode)?;

        let peers = lookup("PEERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let node_id = lookup("NODE_ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        if difficulty > 64 {
            return Err(ConfigError::InvalidValue {
                key: "MINING_DIFFICULTY",
                reason: "must be at most 64".to_string(),
            });
        }

        Ok(NodeConfig {
            host,
            port,
            difficulty,
            peer_timeout,
            max_chain_bytes,
            peers,
            validation_mode,
            node_id,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]).unwrap(), NodeConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "5001"),
            ("MINING_DIFFICULTY", "3"),
            ("PEER_TIMEOUT_SECS", "2"),
            ("MAX_CHAIN_BYTES", "65536"),
            ("PEERS", "http://127.0.0.1:5000, 127.0.0.1:5002,,"),
            ("VALIDATION_MODE", "legacy"),
            ("NODE_ID", "miner-1"),
        ])
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5001);
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.peer_timeout, Duration::from_secs(2));
        assert_eq!(config.max_chain_bytes, 65536);
        assert_eq!(config.peers, vec!["http://127.0.0.1:5000", "127.0.0.1:5002"]);
        assert_eq!(config.validation_mode, ValidationMode::Legacy);
        assert_eq!(config.node_id.as_deref(), Some("miner-1"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("MINING_DIFFICULTY", "65")]),
            Err(ConfigError::InvalidValue { key: "MINING_DIFFICULTY", .. })
        ));
        assert!(matches!(
            config(&[("MAX_CHAIN_BYTES", "-1")]),
            Err(ConfigError::InvalidValue { key: "MAX_CHAIN_BYTES", .. })
        ));
        assert!(matches!(
            config(&[("VALIDATION_MODE", "strict")]),
            Err(ConfigError::InvalidValue { key: "VALIDATION_MODE", .. })
        ));
    }
}
