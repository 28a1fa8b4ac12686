//! Actor implementation - I/O orchestration layer for a node.
//!
//! The [Actor] runs on its own thread and is the only owner of the
//! [SearchEngine]. Connection handlers and [crate::Node] handles talk to it
//! over channels, so every state transition, depth-first session included,
//! happens on a single thread.

pub(crate) mod config;
mod info;
pub(crate) mod socket;

use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::ControlFlow;
use std::thread;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender, TryRecvError};
use tracing::{debug, info, trace, warn};

use crate::common::{Message, PeerAddress, SearchMode};
use crate::core::{Action, SearchEngine, SearchOutcome, Statistics};
use crate::error::{ConfigError, NodeError};

use config::Config;
use socket::{transmit, Inbound, Listener};

pub use info::Info;

/// How long the actor waits for inbound messages before checking for control messages.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long [crate::Node::shutdown] waits for neighbors to acknowledge the BYE.
const BYE_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub(crate) struct Actor {
    engine: SearchEngine,
    listener: Listener,
    inbound: Receiver<Inbound>,
    /// Bootstrap HELLOs are sent off the actor thread and report back here.
    greetings: (Sender<Greeting>, Receiver<Greeting>),
    request_timeout: Option<Duration>,
    /// Result channels of searches originated through a [crate::Node].
    pending: HashMap<(SearchMode, String), Vec<Sender<SearchOutcome>>>,
}

/// Outcome of a bootstrap, to be applied to the neighbor table.
#[derive(Debug)]
struct Greeting {
    results: Vec<(PeerAddress, bool)>,
    reply: Sender<Vec<(PeerAddress, bool)>>,
}

impl Actor {
    /// Binds the listener and loads the initial neighbors and keys.
    pub fn new(config: Config) -> Result<Self, NodeError> {
        let address = PeerAddress::resolve(&config.address)?;

        let (sender, inbound) = flume::unbounded();
        let listener = Listener::bind(address, sender)?;

        let mut engine = SearchEngine::new(listener.local_addr(), config.default_ttl)?;
        for neighbor in config.neighbors {
            engine.add_neighbor(neighbor);
        }
        for (key, value) in config.keys {
            engine.insert_key(key, value);
        }

        info!(address = %listener.local_addr(), "Node listening");

        Ok(Actor {
            engine,
            listener,
            inbound,
            greetings: flume::unbounded(),
            request_timeout: config.request_timeout,
            pending: HashMap::new(),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> PeerAddress {
        self.listener.local_addr()
    }

    /// Runs until a [ActorMessage::Shutdown] arrives or every sender is dropped.
    pub fn run(mut self, control: Receiver<ActorMessage>) {
        loop {
            match control.try_recv() {
                Ok(message) => {
                    if self.handle_control(message).is_break() {
                        break;
                    }
                }
                Err(TryRecvError::Disconnected) => {
                    // Every Node handle was dropped.
                    debug!("peersearch::Node's actor thread was shutdown after Drop.");
                    self.listener.stop();
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            while let Ok(greeting) = self.greetings.1.try_recv() {
                self.greeted(greeting);
            }

            if let Ok((message, peer_ip)) = self.inbound.recv_timeout(POLL_INTERVAL) {
                self.handle_inbound(message, peer_ip);
            }
        }
    }

    // === Private Methods ===

    fn handle_control(&mut self, message: ActorMessage) -> ControlFlow<()> {
        match message {
            ActorMessage::Info(sender) => {
                let _ = sender.send(Info::new(&self.engine, self.pending_searches()));
            }
            ActorMessage::Statistics(sender) => {
                let _ = sender.send(self.engine.statistics().clone());
            }
            ActorMessage::Neighbors(sender) => {
                let _ = sender.send(self.engine.neighbors().to_vec());
            }
            ActorMessage::SetDefaultTtl(ttl, sender) => {
                let _ = sender.send(self.engine.set_default_ttl(ttl));
            }
            ActorMessage::InsertKeys(entries, sender) => {
                for (key, value) in entries {
                    debug!(%key, %value, "Adding key to the local store");
                    self.engine.insert_key(key, value);
                }
                let _ = sender.send(());
            }
            ActorMessage::Bootstrap(addresses, sender) => self.bootstrap(addresses, sender),
            ActorMessage::Hello(index, sender) => match self.engine.neighbors().get(index) {
                Some(neighbor) => {
                    let hello = self.engine.hello();
                    let timeout = self.request_timeout;

                    thread::spawn(move || {
                        let _ = sender.send(Ok(transmit(neighbor, &hello, timeout)));
                    });
                }
                None => {
                    let _ = sender.send(Err(NodeError::InvalidNeighborIndex(index)));
                }
            },
            ActorMessage::ByeToAll(sender) => {
                let results = self.bye_to_all();

                thread::spawn(move || {
                    let acknowledged = results.iter().filter(|(_, ok)| *ok).count();
                    let _ = sender.send(acknowledged);
                });
            }
            ActorMessage::Search {
                mode,
                key,
                outcomes,
                reply,
            } => match self.engine.originate(mode, &key) {
                None => {
                    let _ = reply.send(Err(NodeError::NoNeighbors));
                }
                Some(actions) => {
                    let _ = reply.send(Ok(()));

                    if let [Action::Resolved(outcome)] = actions.as_slice() {
                        let _ = outcomes.send(outcome.clone());
                    } else {
                        self.prune_pending();
                        self.pending.entry((mode, key)).or_default().push(outcomes);
                        self.perform(actions);
                    }
                }
            },
            ActorMessage::Shutdown(sender) => {
                self.shutdown();
                let _ = sender.send(());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn handle_inbound(&mut self, message: Message, peer_ip: IpAddr) {
        match self.engine.handle(message, peer_ip) {
            Ok(actions) => self.perform(actions),
            Err(violation) => {
                warn!(%violation, ?peer_ip, "Dropping message");
            }
        }
    }

    fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { to, message } => {
                    // Detached, a hung peer only stalls its own path.
                    let timeout = self.request_timeout;
                    thread::spawn(move || transmit(to, &message, timeout));
                }
                Action::Resolved(outcome) => self.resolve(outcome),
                Action::Dropped(reason) => {
                    trace!(?reason, "Message dropped");
                }
            }
        }
    }

    fn resolve(&mut self, outcome: SearchOutcome) {
        let key = (outcome.mode(), outcome.key().to_string());

        match &outcome {
            SearchOutcome::Exhausted { .. } => {
                info!(key = outcome.key(), "Depth-first search could not locate the key");

                // Terminal, dropping the senders ends the responses.
                for sender in self.pending.remove(&key).unwrap_or_default() {
                    let _ = sender.send(outcome.clone());
                }
            }
            _ => {
                info!(
                    mode = ?outcome.mode(),
                    key = outcome.key(),
                    value = ?outcome.value(),
                    "Value found"
                );

                if let Some(senders) = self.pending.get_mut(&key) {
                    senders.retain(|sender| sender.send(outcome.clone()).is_ok());

                    if senders.is_empty() {
                        self.pending.remove(&key);
                    }
                }
            }
        }
    }

    /// Forgets searches whose every [crate::Response] was dropped.
    fn prune_pending(&mut self) {
        self.pending.retain(|_, senders| {
            senders.retain(|sender| !sender.is_disconnected());
            !senders.is_empty()
        });
    }

    fn pending_searches(&self) -> usize {
        self.pending.len()
    }

    /// Sends one HELLO to every address in order, on a separate thread.
    ///
    /// The acknowledged addresses are added once the results come back as a [Greeting].
    fn bootstrap(
        &mut self,
        addresses: Vec<PeerAddress>,
        reply: Sender<Vec<(PeerAddress, bool)>>,
    ) {
        let hello = self.engine.hello();
        let timeout = self.request_timeout;
        let greetings = self.greetings.0.clone();

        thread::spawn(move || {
            let results = addresses
                .into_iter()
                .map(|address| (address, transmit(address, &hello, timeout)))
                .collect();

            let _ = greetings.send(Greeting { results, reply });
        });
    }

    fn greeted(&mut self, greeting: Greeting) {
        for (address, acknowledged) in &greeting.results {
            if !acknowledged {
                continue;
            }

            if self.engine.add_neighbor(*address) {
                debug!(neighbor = %address, "Added neighbor");
            } else {
                debug!(neighbor = %address, "Neighbor already known");
            }
        }

        let _ = greeting.reply.send(greeting.results);
    }

    /// Sends one BYE to every neighbor, each on its own thread.
    ///
    /// The returned receiver yields one `(neighbor, acknowledged)` per neighbor
    /// and disconnects once every send finished.
    fn bye_to_all(&mut self) -> Receiver<(PeerAddress, bool)> {
        let bye = self.engine.bye();
        let (sender, receiver) = flume::unbounded();

        for neighbor in self.engine.neighbors() {
            let neighbor = *neighbor;
            let bye = bye.clone();
            let sender = sender.clone();
            let timeout = self.request_timeout;

            thread::spawn(move || {
                let _ = sender.send((neighbor, transmit(neighbor, &bye, timeout)));
            });
        }

        receiver
    }

    fn shutdown(&mut self) {
        let results = self.bye_to_all();
        let deadline = Instant::now() + BYE_GRACE_PERIOD;

        let mut acknowledged = 0;
        while let Ok((_, ok)) = results.recv_deadline(deadline) {
            if ok {
                acknowledged += 1;
            }
        }

        self.listener.stop();

        info!(
            address = %self.engine.address(),
            acknowledged,
            "Node shutdown"
        );
    }
}

#[derive(Debug)]
pub(crate) enum ActorMessage {
    Info(Sender<Info>),
    Statistics(Sender<Statistics>),
    Neighbors(Sender<Vec<PeerAddress>>),
    SetDefaultTtl(i64, Sender<Result<(), ConfigError>>),
    InsertKeys(Vec<(String, String)>, Sender<()>),
    Bootstrap(Vec<PeerAddress>, Sender<Vec<(PeerAddress, bool)>>),
    Hello(usize, Sender<Result<bool, NodeError>>),
    ByeToAll(Sender<usize>),
    Search {
        mode: SearchMode,
        key: String,
        outcomes: Sender<SearchOutcome>,
        reply: Sender<Result<(), NodeError>>,
    },
    Shutdown(Sender<()>),
}
