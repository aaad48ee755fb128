//! Types, errors and traits shared by the consensus client subsystems.
//!
//! The three consumer-facing capabilities ([`BatchFetcher`], [`ConsensusInfo`] and
//! [`ConsensusSequencer`]) return [`ConsensusPromise`]s. The subsystems implementing them talk
//! to the consensus node through the remote traits ([`BatchSource`], [`SyncSource`] and
//! [`SequencerSink`]) and run that work on a shared [`TaskPool`].

mod errors;
mod pool;
mod retry;
mod traits;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{ConsensusError, ErrorKind, Resource};
pub use pool::{PoolConfig, TaskPool};
pub use retry::{retry_transient, RetryConfig};
#[cfg(feature = "test-utils")]
pub use traits::remote::{MockBatchSource, MockSequencerSink, MockSyncSource};
pub use traits::{
    remote::{BatchSource, SequencerSink, SyncSource},
    subsystems::{BatchFetcher, ConsensusInfo, ConsensusSequencer, FullConsensusClient},
};
pub use types::{
    ids::{BatchNumber, L1BlockNumber, MessageIndex},
    message::{Batch, L1IncomingMessage, L1IncomingMessageHeader, MessageWithMetadata},
    progress::{MessageCounts, ProgressCounter, SyncProgressSnapshot},
};

/// Promise type returned by every consensus client operation.
pub type ConsensusPromise<T> = consensus_client_promise::Promise<T, ConsensusError>;
