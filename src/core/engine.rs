//! Sans-I/O protocol engine: every decision a node makes about a message.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::common::{DedupKey, Message, Operation, PeerAddress, SearchArguments, SearchMode};
use crate::error::ConfigError;

use super::depth_first::{DepthFirstSession, DepthFirstStep};
use super::neighbors::NeighborTable;
use super::statistics::Statistics;

#[derive(Debug)]
/// All mutable state of a node, and the search algorithms operating on it.
///
/// The engine never touches a socket. Handling a message returns the
/// [Action]s the I/O layer has to carry out.
pub struct SearchEngine {
    address: PeerAddress,
    neighbors: NeighborTable,
    keys: HashMap<String, String>,
    next_seqno: u64,
    default_ttl: i64,
    /// Never pruned.
    seen: HashSet<DedupKey>,
    session: DepthFirstSession,
    statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Transmit `message` to `to`.
    Send { to: PeerAddress, message: Message },
    /// A search originated by this node produced a result.
    Resolved(SearchOutcome),
    /// The message was discarded without further action.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A flood search this node already relayed.
    Duplicate,
    /// The hop budget ran out.
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The key was in the local store, no message was sent.
    Local {
        mode: SearchMode,
        key: String,
        value: String,
    },
    /// A VAL reply arrived from `holder`.
    Found {
        mode: SearchMode,
        key: String,
        value: String,
        hop_count: u32,
        holder: PeerAddress,
    },
    /// A depth-first search came back to its originator with every neighbor explored.
    Exhausted { key: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// A message that is well formed but makes no sense to this node.
pub enum ProtocolViolation {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Unexpected {0}_OK outside of an acknowledgement")]
    UnexpectedAcknowledgement(String),

    #[error("Depth-first search {0:?} has no parent to backtrack to")]
    NoParent(DedupKey),
}

impl SearchEngine {
    pub fn new(address: PeerAddress, default_ttl: i64) -> Result<Self, ConfigError> {
        validate_ttl(default_ttl)?;

        Ok(SearchEngine {
            address,
            neighbors: NeighborTable::new(),
            keys: HashMap::new(),
            next_seqno: 1,
            default_ttl,
            seen: HashSet::new(),
            session: DepthFirstSession::default(),
            statistics: Statistics::new(),
        })
    }

    // === Getters ===

    pub fn address(&self) -> PeerAddress {
        self.address
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    pub fn session(&self) -> &DepthFirstSession {
        &self.session
    }

    pub fn keys_count(&self) -> usize {
        self.keys.len()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    // === Control ===

    pub fn set_default_ttl(&mut self, ttl: i64) -> Result<(), ConfigError> {
        validate_ttl(ttl)?;
        self.default_ttl = ttl;
        Ok(())
    }

    /// Returns `true` if `address` was not a neighbor yet.
    pub fn add_neighbor(&mut self, address: PeerAddress) -> bool {
        self.neighbors.add(address)
    }

    pub fn insert_key(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.insert(key.into(), value.into());
    }

    /// A HELLO with a fresh sequence number.
    pub fn hello(&mut self) -> Message {
        Message::hello(self.address, self.next_seqno())
    }

    /// A BYE with a fresh sequence number.
    pub fn bye(&mut self) -> Message {
        Message::bye(self.address, self.next_seqno())
    }

    /// Starts a search for `key`.
    ///
    /// Resolves immediately on a local hit. Returns `None` if the key is not
    /// local and there is no neighbor to ask.
    pub fn originate(&mut self, mode: SearchMode, key: &str) -> Option<Vec<Action>> {
        if let Some(value) = self.lookup(key) {
            return Some(vec![Action::Resolved(SearchOutcome::Local {
                mode,
                key: key.to_string(),
                value: value.to_string(),
            })]);
        }

        if self.neighbors.is_empty() {
            return None;
        }

        let message = Message::search(
            self.address,
            self.next_seqno(),
            self.default_ttl,
            mode,
            key,
        );
        self.seen.insert(message.dedup_key());

        let targets = match mode {
            SearchMode::Flood => self.neighbors.to_vec(),
            SearchMode::RandomWalk => self
                .neighbors
                .as_slice()
                .choose(&mut rand::thread_rng())
                .copied()
                .into_iter()
                .collect(),
            SearchMode::DepthFirst => {
                self.session = DepthFirstSession::originate(self.address, self.neighbors.to_vec())?;
                self.session.active().into_iter().collect()
            }
        };

        debug!(?mode, key, seqno = message.seqno, "Originating search");

        Some(
            targets
                .into_iter()
                .map(|to| Action::Send {
                    to,
                    message: message.clone(),
                })
                .collect(),
        )
    }

    // === Inbound ===

    /// Handles a message received over a connection from `peer_ip`.
    pub fn handle(
        &mut self,
        message: Message,
        peer_ip: IpAddr,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        match &message.operation {
            Operation::Hello => {
                if self.neighbors.add(message.origin) {
                    debug!(neighbor = %message.origin, "Added neighbor");
                } else {
                    debug!(neighbor = %message.origin, "Neighbor already known");
                }
                Ok(vec![])
            }
            Operation::Bye => {
                if self.neighbors.remove(&message.origin) {
                    debug!(neighbor = %message.origin, "Removed neighbor");
                }
                Ok(vec![])
            }
            Operation::Val(arguments) => {
                debug!(
                    mode = ?arguments.mode,
                    key = %arguments.key,
                    value = %arguments.value,
                    hops = arguments.hop_count,
                    "Value found"
                );
                self.statistics
                    .record_hops(arguments.mode, arguments.hop_count);

                Ok(vec![Action::Resolved(SearchOutcome::Found {
                    mode: arguments.mode,
                    key: arguments.key.clone(),
                    value: arguments.value.clone(),
                    hop_count: arguments.hop_count,
                    holder: message.origin,
                })])
            }
            Operation::Search(arguments) => {
                let arguments = arguments.clone();
                self.handle_search(&message, arguments, peer_ip)
            }
            Operation::Acknowledgement(name) => {
                Err(ProtocolViolation::UnexpectedAcknowledgement(name.clone()))
            }
            Operation::Unknown { name, .. } => {
                Err(ProtocolViolation::UnknownOperation(name.clone()))
            }
        }
    }

    // === Private Methods ===

    fn next_seqno(&mut self) -> u64 {
        let seqno = self.next_seqno;
        self.next_seqno += 1;
        seqno
    }

    fn handle_search(
        &mut self,
        message: &Message,
        arguments: SearchArguments,
        peer_ip: IpAddr,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        let mode = arguments.mode;
        let last_hop = PeerAddress::new(peer_ip, arguments.relay_port);
        let dedup_key = message.dedup_key();

        self.statistics.record_seen(mode);

        let first_seen = self.seen.insert(dedup_key.clone());

        if !first_seen && mode == SearchMode::Flood {
            debug!(?dedup_key, "Discarding duplicate flood search");
            return Ok(vec![Action::Dropped(DropReason::Duplicate)]);
        }

        if let Some(value) = self.keys.get(&arguments.key).cloned() {
            let reply = Message::val(
                self.address,
                self.next_seqno(),
                mode,
                arguments.key.clone(),
                value,
                arguments.hop_count,
            );

            debug!(?mode, key = %arguments.key, origin = %message.origin, "Key found, replying to origin");

            return Ok(vec![Action::Send {
                to: message.origin,
                message: reply,
            }]);
        }

        let forwarded = match message.forward(self.address) {
            Some(forwarded) if !forwarded.is_expired() => forwarded,
            _ => {
                debug!(?dedup_key, "TTL exhausted, discarding search");
                return Ok(vec![Action::Dropped(DropReason::Expired)]);
            }
        };

        let targets = match mode {
            SearchMode::Flood => self.neighbors.except(&last_hop),
            SearchMode::RandomWalk => vec![self.random_next_hop(&last_hop)],
            SearchMode::DepthFirst => {
                return self.depth_first(forwarded, dedup_key, last_hop, first_seen, arguments.key)
            }
        };

        Ok(targets
            .into_iter()
            .map(|to| Action::Send {
                to,
                message: forwarded.clone(),
            })
            .collect())
    }

    /// A uniformly random neighbor other than `last_hop`, or `last_hop` itself
    /// when it is the only way out.
    fn random_next_hop(&self, last_hop: &PeerAddress) -> PeerAddress {
        self.neighbors
            .except(last_hop)
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(*last_hop)
    }

    fn depth_first(
        &mut self,
        forwarded: Message,
        dedup_key: DedupKey,
        last_hop: PeerAddress,
        first_seen: bool,
        key: String,
    ) -> Result<Vec<Action>, ProtocolViolation> {
        if first_seen {
            self.session = DepthFirstSession::relay(last_hop, self.neighbors.except(&last_hop));
        }

        let to = match self.session.step(self.address, last_hop) {
            DepthFirstStep::Exhausted => {
                debug!(key = %key, "Depth-first search could not locate the key");
                return Ok(vec![Action::Resolved(SearchOutcome::Exhausted { key })]);
            }
            DepthFirstStep::Bounce(to) => {
                debug!(%to, "Cycle detected, returning the search");
                to
            }
            DepthFirstStep::Backtrack(to) => {
                debug!(%to, "No neighbor found the key, backtracking");
                to
            }
            DepthFirstStep::Descend(to) => to,
            DepthFirstStep::Orphaned => return Err(ProtocolViolation::NoParent(dedup_key)),
        };

        Ok(vec![Action::Send {
            to,
            message: forwarded,
        }])
    }
}

impl SearchOutcome {
    pub fn mode(&self) -> SearchMode {
        match self {
            SearchOutcome::Local { mode, .. } | SearchOutcome::Found { mode, .. } => *mode,
            SearchOutcome::Exhausted { .. } => SearchMode::DepthFirst,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            SearchOutcome::Local { key, .. }
            | SearchOutcome::Found { key, .. }
            | SearchOutcome::Exhausted { key } => key,
        }
    }

    /// The value, unless the search was exhausted.
    pub fn value(&self) -> Option<&str> {
        match self {
            SearchOutcome::Local { value, .. } | SearchOutcome::Found { value, .. } => Some(value),
            SearchOutcome::Exhausted { .. } => None,
        }
    }
}

fn validate_ttl(ttl: i64) -> Result<(), ConfigError> {
    if ttl <= 0 {
        return Err(ConfigError::NonPositiveTtl(ttl));
    }
    Ok(())
}
