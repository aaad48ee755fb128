//! Pull-based view of the consensus node's sync progress.
//!
//! Counts are re-queried once their cached value expires and are checked on arrival: a count
//! that goes backwards, or drops below a count it must dominate, is rejected instead of
//! being handed to the execution side.

mod config;
mod state;
mod tracker;

pub use config::SyncTrackerConfig;
pub use tracker::SyncTracker;
