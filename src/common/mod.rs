//! Value types shared by the protocol core and the I/O layer.

mod address;
pub mod messages;

pub use address::*;
pub use messages::*;
