//! Node handle, the control API of a running peer.

use std::path::Path;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

use crate::actor::config::Config;
use crate::actor::{Actor, ActorMessage, Info};
use crate::bootstrap;
use crate::common::{PeerAddress, SearchMode};
use crate::core::{SearchOutcome, Statistics};
use crate::error::{ConfigError, NodeError, NodeWasShutdown};

#[derive(Debug, Clone)]
/// A handle to a running node.
///
/// Cloning is cheap, every clone talks to the same actor thread. The node
/// keeps running until [Node::shutdown] is called or every handle is dropped.
pub struct Node(pub(crate) Sender<ActorMessage>);

#[derive(Debug, Default, Clone)]
/// Node builder
pub struct NodeBuilder(Config);

impl NodeBuilder {
    /// Set the `host:port` to listen on, use port `0` for an OS assigned port.
    pub fn address(&mut self, address: &str) -> &mut Self {
        self.0.address = address.to_string();

        self
    }

    /// Set the TTL of originated searches.
    pub fn default_ttl(&mut self, ttl: i64) -> &mut Self {
        self.0.default_ttl = ttl;

        self
    }

    /// Set the timeout of outbound connections.
    pub fn request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.0.request_timeout = Some(timeout);

        self
    }

    /// Add neighbors to the table at startup, no HELLO is sent to them.
    ///
    /// Use [Node::greet_neighbors] to greet neighbors and keep only the reachable ones.
    pub fn neighbors(&mut self, neighbors: &[PeerAddress]) -> &mut Self {
        self.0.neighbors.extend_from_slice(neighbors);

        self
    }

    /// Add key-value pairs to the local store.
    pub fn keys<K: Into<String>, V: Into<String>>(
        &mut self,
        keys: impl IntoIterator<Item = (K, V)>,
    ) -> &mut Self {
        self.0
            .keys
            .extend(keys.into_iter().map(|(k, v)| (k.into(), v.into())));

        self
    }

    /// Create a Node with this builder's configuration.
    pub fn build(&self) -> Result<Node, NodeError> {
        Node::new(self.0.clone())
    }
}

impl Node {
    /// Create a new node with the default [Config], listening on an OS assigned loopback port.
    pub fn client() -> Result<Self, NodeError> {
        Node::builder().build()
    }

    /// Returns a builder to edit settings before creating a Node.
    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    /// Create a new node from a [Config].
    ///
    /// Binds the listener before returning, so the node accepts connections
    /// as soon as this returns `Ok`.
    pub fn new(config: Config) -> Result<Self, NodeError> {
        let (sender, receiver) = flume::unbounded();

        let actor = Actor::new(config)?;
        let port = actor.local_addr().port();

        thread::Builder::new()
            .name(format!("peersearch-node-{port}"))
            .spawn(move || actor.run(receiver))?;

        Ok(Node(sender))
    }

    // === Getters ===

    /// Information about this node.
    pub fn info(&self) -> Result<Info, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.send(ActorMessage::Info(sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)
    }

    /// The address this node listens on.
    pub fn local_addr(&self) -> Result<PeerAddress, NodeWasShutdown> {
        Ok(self.info()?.address())
    }

    /// Per mode search counters and hop statistics.
    pub fn statistics(&self) -> Result<Statistics, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<Statistics>(1);

        self.send(ActorMessage::Statistics(sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)
    }

    /// The neighbor table, in insertion order.
    ///
    /// Indexes in this list are the ones [Node::send_hello] accepts.
    pub fn neighbors(&self) -> Result<Vec<PeerAddress>, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<PeerAddress>>(1);

        self.send(ActorMessage::Neighbors(sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)
    }

    // === Public Methods ===

    /// Reads a neighbors file, one `host:port` per line, and greets them with
    /// [Node::greet_neighbors].
    ///
    /// Nothing is sent if any line fails to resolve.
    pub fn bootstrap_neighbors(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<(PeerAddress, bool)>, NodeError> {
        let addresses = bootstrap::read_neighbors(path)?;

        Ok(self.greet_neighbors(&addresses)?)
    }

    /// Greets each address with a HELLO, and adds to the neighbor table
    /// the ones that acknowledged it.
    ///
    /// All the HELLOs share one sequence number. Returns each address with
    /// whether it acknowledged.
    pub fn greet_neighbors(
        &self,
        addresses: &[PeerAddress],
    ) -> Result<Vec<(PeerAddress, bool)>, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.send(ActorMessage::Bootstrap(addresses.to_vec(), sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)
    }

    /// Reads a keys file, one `key value` pair per line, into the local store.
    ///
    /// Nothing is stored if any line is malformed.
    pub fn bootstrap_keys(&self, path: impl AsRef<Path>) -> Result<(), NodeError> {
        let keys = bootstrap::read_keys(path)?;

        Ok(self.insert_keys(keys)?)
    }

    /// Adds key-value pairs to the local store, overwriting existing keys.
    pub fn insert_keys<K: Into<String>, V: Into<String>>(
        &self,
        keys: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<()>(1);

        let keys = keys
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        self.send(ActorMessage::InsertKeys(keys, sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)
    }

    /// Sends a HELLO to the neighbor at `index` in [Node::neighbors].
    ///
    /// Returns whether the neighbor acknowledged it.
    pub fn send_hello(&self, index: usize) -> Result<bool, NodeError> {
        let (sender, receiver) = flume::bounded(1);

        self.send(ActorMessage::Hello(index, sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)?
    }

    /// Sends a BYE to every neighbor, without leaving the overlay.
    ///
    /// Returns the number of neighbors that acknowledged it.
    pub fn send_bye_to_all(&self) -> Result<usize, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<usize>(1);

        self.send(ActorMessage::ByeToAll(sender))?;

        receiver.recv().map_err(|_| NodeWasShutdown)
    }

    /// Sets the TTL of searches originated from now on.
    pub fn set_default_ttl(&self, ttl: i64) -> Result<(), NodeError> {
        let (sender, receiver) = flume::bounded::<Result<(), ConfigError>>(1);

        self.send(ActorMessage::SetDefaultTtl(ttl, sender))?;

        Ok(receiver.recv().map_err(|_| NodeWasShutdown)??)
    }

    /// Originates a search for `key`.
    ///
    /// A key held locally resolves immediately without touching the network.
    /// Otherwise the returned [Response] yields every value that arrives for
    /// this key and mode. It ends after [SearchOutcome::Exhausted], or when
    /// the node shuts down, so prefer [Response::recv_timeout] for flood and
    /// random walk searches that may never be answered.
    ///
    /// Returns [NodeError::NoNeighbors] without consuming a sequence number
    /// if the key is not local and the neighbor table is empty.
    pub fn search(&self, mode: SearchMode, key: &str) -> Result<Response<SearchOutcome>, NodeError> {
        // Search results use unbounded channels to avoid blocking the actor,
        // replies carrying a single value use bounded channels.
        let (outcomes, receiver) = flume::unbounded::<SearchOutcome>();
        let (reply, reply_receiver) = flume::bounded::<Result<(), NodeError>>(1);

        self.send(ActorMessage::Search {
            mode,
            key: key.to_string(),
            outcomes,
            reply,
        })?;

        reply_receiver.recv().map_err(|_| NodeWasShutdown)??;

        Ok(Response { receiver })
    }

    /// Broadcasts a BYE to all neighbors, stops the listener and the actor thread.
    ///
    /// Waits up to two seconds for neighbors to acknowledge the BYE. Calling
    /// it on a node that was already shut down is a no-op.
    pub fn shutdown(&self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }

    // === Private Methods ===

    pub(crate) fn send(&self, message: ActorMessage) -> Result<(), NodeWasShutdown> {
        self.0.send(message).map_err(|_| NodeWasShutdown)
    }
}

/// Values arriving for an originated search.
///
/// Iterating blocks until the next value, and ends when no more values can arrive.
pub struct Response<T> {
    pub(crate) receiver: Receiver<T>,
}

impl<T> Response<T> {
    /// Waits up to `timeout` for the next value.
    ///
    /// Returns `None` on timeout, or if no more values can arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Returns the next value if one already arrived.
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Iterator for Response<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

impl<T> std::fmt::Debug for Response<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("pending", &self.receiver.len())
            .finish()
    }
}
