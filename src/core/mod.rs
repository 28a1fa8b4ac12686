//! Protocol logic free of any I/O.

mod depth_first;
mod engine;
mod neighbors;
mod statistics;

pub use depth_first::{DepthFirstSession, DepthFirstStep};
pub use engine::{Action, DropReason, ProtocolViolation, SearchEngine, SearchOutcome};
pub use neighbors::NeighborTable;
pub use statistics::{HopSummary, Statistics};
