//! Ephemeral screenshot storage
//!
//! Holds the latest screenshot per question in memory and expires old
//! records on a fixed schedule.

mod cleanup;
mod screenshots;

pub use cleanup::*;
pub use screenshots::*;
