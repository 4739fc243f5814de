use dashmap::DashSet;
use hyper::Uri;
use log::info;
use thiserror::Error;

/// Errors that can occur while registering peers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
}

/// Set of known peers, keyed by their `host[:port]` form
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashSet<String>,
}

impl PeerRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer from an address such as `http://10.0.0.2:5000`
    /// or `10.0.0.2:5000`
    ///
    /// Registering the same peer twice is a no-op.
    ///
    /// # Returns
    ///
    /// The normalized `host[:port]` the peer is stored under
    pub fn register(&self, address: &str) -> Result<String, PeerError> {
        let peer = normalize_address(address)?;
        if self.peers.insert(peer.clone()) {
            info!("Registered peer {}", peer);
        }
        Ok(peer)
    }

    /// Gets all registered peers, sorted
    pub fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self.peers.iter().map(|p| p.key().clone()).collect();
        members.sort();
        members
    }

    /// Gets the number of registered peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Checks if no peer is registered
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Extracts the network location (`host[:port]`) of a peer address
pub fn normalize_address(address: &str) -> Result<String, PeerError> {
    let trimmed = address.trim();
    let uri: Uri = trimmed
        .parse()
        .map_err(|_| PeerError::InvalidAddress(address.to_string()))?;

    uri.authority()
        .map(|authority| authority.as_str().to_ascii_lowercase())
        .filter(|authority| !authority.is_empty())
        .ok_or_else(|| PeerError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_address("http://192.168.0.5:5000").unwrap(), "192.168.0.5:5000");
        assert_eq!(normalize_address("http://node.example:5000/chain").unwrap(), "node.example:5000");
        assert_eq!(normalize_address("https://Node.Example").unwrap(), "node.example");
    }

    #[test]
    fn test_normalize_bare_authority() {
        assert_eq!(normalize_address("127.0.0.1:5001").unwrap(), "127.0.0.1:5001");
        assert_eq!(normalize_address(" localhost:5002 ").unwrap(), "localhost:5002");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_address("").is_err());
        assert!(normalize_address("/chain").is_err());
        assert!(normalize_address("not a url").is_err());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = PeerRegistry::new();

        registry.register("http://127.0.0.1:5001").unwrap();
        registry.register("127.0.0.1:5001").unwrap();
        registry.register("http://127.0.0.1:5000").unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.members(), vec!["127.0.0.1:5000", "127.0.0.1:5001"]);
    }

    #[test]
    fn test_register_invalid_leaves_registry_untouched() {
        let registry = PeerRegistry::new();

        assert_eq!(
            registry.register("/nodes"),
            Err(PeerError::InvalidAddress("/nodes".to_string()))
        );
        assert!(registry.is_empty());
    }
}
