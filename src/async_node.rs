//! Async version of the [Node] handle.

use std::path::Path;

use crate::{
    actor::{ActorMessage, Info},
    bootstrap,
    common::{PeerAddress, SearchMode},
    core::{SearchOutcome, Statistics},
    error::{ConfigError, NodeError, NodeWasShutdown},
    node::Node,
};

impl Node {
    /// Return an async version of the Node handle.
    pub fn as_async(self) -> AsyncNode {
        AsyncNode(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the [Node] handle.
pub struct AsyncNode(Node);

impl AsyncNode {
    // === Getters ===

    /// Information about this node.
    pub async fn info(&self) -> Result<Info, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0.send(ActorMessage::Info(sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)
    }

    /// The address this node listens on.
    pub async fn local_addr(&self) -> Result<PeerAddress, NodeWasShutdown> {
        Ok(self.info().await?.address())
    }

    /// Per mode search counters and hop statistics.
    pub async fn statistics(&self) -> Result<Statistics, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<Statistics>(1);

        self.0.send(ActorMessage::Statistics(sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)
    }

    /// The neighbor table, in insertion order.
    pub async fn neighbors(&self) -> Result<Vec<PeerAddress>, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<PeerAddress>>(1);

        self.0.send(ActorMessage::Neighbors(sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)
    }

    // === Public Methods ===

    /// Async version of [Node::bootstrap_neighbors].
    ///
    /// The file is read on the calling thread.
    pub async fn bootstrap_neighbors(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<(PeerAddress, bool)>, NodeError> {
        let addresses = bootstrap::read_neighbors(path)?;

        Ok(self.greet_neighbors(&addresses).await?)
    }

    /// Async version of [Node::greet_neighbors].
    pub async fn greet_neighbors(
        &self,
        addresses: &[PeerAddress],
    ) -> Result<Vec<(PeerAddress, bool)>, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded(1);

        self.0
            .send(ActorMessage::Bootstrap(addresses.to_vec(), sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)
    }

    /// Async version of [Node::bootstrap_keys].
    pub async fn bootstrap_keys(&self, path: impl AsRef<Path>) -> Result<(), NodeError> {
        let keys = bootstrap::read_keys(path)?;

        Ok(self.insert_keys(keys).await?)
    }

    /// Async version of [Node::insert_keys].
    pub async fn insert_keys<K: Into<String>, V: Into<String>>(
        &self,
        keys: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<()>(1);

        let keys = keys
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        self.0.send(ActorMessage::InsertKeys(keys, sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)
    }

    /// Async version of [Node::send_hello].
    pub async fn send_hello(&self, index: usize) -> Result<bool, NodeError> {
        let (sender, receiver) = flume::bounded(1);

        self.0.send(ActorMessage::Hello(index, sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)?
    }

    /// Async version of [Node::send_bye_to_all].
    pub async fn send_bye_to_all(&self) -> Result<usize, NodeWasShutdown> {
        let (sender, receiver) = flume::bounded::<usize>(1);

        self.0.send(ActorMessage::ByeToAll(sender))?;

        receiver.recv_async().await.map_err(|_| NodeWasShutdown)
    }

    /// Async version of [Node::set_default_ttl].
    pub async fn set_default_ttl(&self, ttl: i64) -> Result<(), NodeError> {
        let (sender, receiver) = flume::bounded::<Result<(), ConfigError>>(1);

        self.0.send(ActorMessage::SetDefaultTtl(ttl, sender))?;

        Ok(receiver.recv_async().await.map_err(|_| NodeWasShutdown)??)
    }

    /// Async version of [Node::search], yielding values as a stream.
    pub async fn search(
        &self,
        mode: SearchMode,
        key: &str,
    ) -> Result<flume::r#async::RecvStream<'static, SearchOutcome>, NodeError> {
        let (outcomes, receiver) = flume::unbounded::<SearchOutcome>();
        let (reply, reply_receiver) = flume::bounded::<Result<(), NodeError>>(1);

        self.0.send(ActorMessage::Search {
            mode,
            key: key.to_string(),
            outcomes,
            reply,
        })?;

        reply_receiver
            .recv_async()
            .await
            .map_err(|_| NodeWasShutdown)??;

        Ok(receiver.into_stream())
    }

    /// Broadcasts a BYE to all neighbors, stops the listener and the actor thread.
    pub async fn shutdown(&self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }
}

#[cfg(test)]
mod test {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn shutdown() {
        async fn test() {
            let node = Node::client().unwrap().as_async();

            let a = node.clone();

            node.shutdown().await;

            let result = a.info().await;

            assert!(matches!(result, Err(NodeWasShutdown)))
        }
        futures::executor::block_on(test());
    }

    #[test]
    fn flood_search() {
        async fn test() {
            let a = Node::client().unwrap().as_async();
            let b = Node::builder()
                .keys([("apple", "red")])
                .build()
                .unwrap()
                .as_async();

            let b_address = b.local_addr().await.unwrap();
            let greeted = a.greet_neighbors(&[b_address]).await.unwrap();
            assert_eq!(greeted, vec![(b_address, true)]);

            let mut values = a.search(SearchMode::Flood, "apple").await.unwrap();

            match values.next().await {
                Some(SearchOutcome::Found {
                    value,
                    hop_count,
                    holder,
                    ..
                }) => {
                    assert_eq!(value, "red");
                    assert_eq!(hop_count, 1);
                    assert_eq!(holder, b_address);
                }
                other => panic!("unexpected outcome {other:?}"),
            }

            assert_eq!(
                a.statistics().await.unwrap().summarize(SearchMode::Flood),
                "1.00 (std dev 0.00)"
            );

            a.shutdown().await;
            b.shutdown().await;
        }
        futures::executor::block_on(test());
    }

    #[test]
    fn errors() {
        async fn test() {
            let node = Node::client().unwrap().as_async();

            assert!(matches!(
                node.search(SearchMode::RandomWalk, "missing").await,
                Err(NodeError::NoNeighbors)
            ));
            assert!(matches!(
                node.set_default_ttl(0).await,
                Err(NodeError::Config(ConfigError::NonPositiveTtl(0)))
            ));
            assert!(matches!(
                node.send_hello(0).await,
                Err(NodeError::InvalidNeighborIndex(0))
            ));

            node.shutdown().await;
        }
        futures::executor::block_on(test());
    }
}
