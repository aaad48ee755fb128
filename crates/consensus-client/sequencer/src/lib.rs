//! Single-writer access to the consensus message log.
//!
//! Writes and lease probes are queued to one coordinator task and handled strictly in
//! submission order. The coordinator keeps the tail of the log it knows about and rejects
//! writes that cannot be accepted without asking the consensus node.

mod config;
mod handle;
mod state;
mod status;
mod task;

pub use config::SequencerConfig;
pub use handle::{SequencerBuilder, SequencerCoordinator};
pub use status::SequencerStatus;
