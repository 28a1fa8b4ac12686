use std::time::Duration;

use crate::common::PeerAddress;

/// Address a node listens on when none is configured, an OS assigned port on loopback.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:0";
/// Hop budget of searches originated by a fresh node.
pub const DEFAULT_TTL: i64 = 100;

#[derive(Debug, Clone)]
/// Node configurations
pub struct Config {
    /// `host:port` to listen on.
    ///
    /// The bound address is also the origin this node stamps on its messages,
    /// so it has to be reachable by its neighbors.
    ///
    /// Defaults to [DEFAULT_ADDRESS]
    pub address: String,
    /// TTL of originated searches, must be greater than 0.
    ///
    /// Defaults to [DEFAULT_TTL]
    pub default_ttl: i64,
    /// Connect, read and write timeout of outbound connections.
    ///
    /// Defaults to None, leaving the operating system defaults in place.
    pub request_timeout: Option<Duration>,
    /// Neighbors added to the table at startup, without sending them a HELLO.
    pub neighbors: Vec<PeerAddress>,
    /// Initial content of the local key store.
    pub keys: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            default_ttl: DEFAULT_TTL,
            request_timeout: None,
            neighbors: vec![],
            keys: vec![],
        }
    }
}
