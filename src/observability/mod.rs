//! Log output for the command-line tool.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the binary.

mod tracing_init;

pub use tracing_init::*;
