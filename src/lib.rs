#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

mod common;

mod actor;
#[cfg(feature = "async")]
pub mod async_node;
pub mod bootstrap;
pub mod core;
mod error;
mod node;

pub use crate::common::{
    DedupKey, DedupTag, FormatError, Message, Operation, PeerAddress, SearchArguments,
    SearchMode, ValArguments,
};
pub use actor::config::{Config, DEFAULT_ADDRESS, DEFAULT_TTL};
pub use actor::socket::{
    transmit, try_transmit, TransmitError, ACK_BUFFER_SIZE, LISTENER_POLL_INTERVAL,
};
pub use actor::Info;
pub use node::{Node, NodeBuilder, Response};

pub use crate::core::{HopSummary, SearchOutcome, Statistics};

pub mod errors {
    //! Exported errors
    pub use super::core::ProtocolViolation;
    pub use super::error::{ConfigError, NodeError, NodeWasShutdown};
    pub use super::FormatError;
    pub use super::TransmitError;
}
