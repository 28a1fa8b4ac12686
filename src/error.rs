//! Errors surfaced to callers of the control API.

use crate::common::FormatError;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Rejected configuration value, the node state is left unchanged.
pub enum ConfigError {
    #[error("TTL must be greater than 0, got {0}")]
    NonPositiveTtl(i64),
}

#[derive(thiserror::Error, Debug)]
/// Errors returned by [crate::Node] methods.
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("There are no neighbors to search through")]
    NoNeighbors,

    #[error("No neighbor at index {0}")]
    InvalidNeighborIndex(usize),

    #[error(transparent)]
    WasShutdown(#[from] NodeWasShutdown),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The node actor was shutdown")]
/// The node's actor thread is gone, either explicitly or after all handles were dropped.
pub struct NodeWasShutdown;
