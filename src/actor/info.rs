use crate::common::PeerAddress;
use crate::core::SearchEngine;

/// Information about a running node.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    address: PeerAddress,
    default_ttl: i64,
    neighbors: usize,
    keys: usize,
    seen_messages: usize,
    pending_searches: usize,
}

impl Info {
    /// The address this node listens on and stamps as origin of its messages.
    pub fn address(&self) -> PeerAddress {
        self.address
    }
    /// TTL of searches originated from now on.
    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }
    /// Number of entries in the neighbor table.
    pub fn neighbors(&self) -> usize {
        self.neighbors
    }
    /// Number of entries in the local key store.
    pub fn keys(&self) -> usize {
        self.keys
    }
    /// Size of the deduplication set, which grows for the lifetime of the node.
    pub fn seen_messages(&self) -> usize {
        self.seen_messages
    }
    /// Originated `(mode, key)` searches still tracked for results.
    ///
    /// Searches whose [crate::Response]s were all dropped are forgotten on the next search.
    pub fn pending_searches(&self) -> usize {
        self.pending_searches
    }
}

impl Info {
    pub(crate) fn new(engine: &SearchEngine, pending_searches: usize) -> Self {
        Self {
            address: engine.address(),
            default_ttl: engine.default_ttl(),
            neighbors: engine.neighbors().len(),
            keys: engine.keys_count(),
            seen_messages: engine.seen_count(),
            pending_searches,
        }
    }
}
