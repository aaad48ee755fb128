use std::fmt;

use consensus_client_promise::WaitError;
use thiserror::Error;

use crate::{BatchNumber, MessageIndex, ProgressCounter};

/// Something the consensus node has not produced or learned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Batch(BatchNumber),
    BatchL1Block(BatchNumber),
    MessageBatch(MessageIndex),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch(batch) => write!(f, "batch {batch}"),
            Self::BatchL1Block(batch) => write!(f, "l1 block of batch {batch}"),
            Self::MessageBatch(msg) => write!(f, "batch containing message {msg}"),
        }
    }
}

/// Coarse classification of [`ConsensusError`] that callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Worth retrying later, nothing was decided.
    Transient,
    /// The data does not exist yet but may appear as consensus progresses.
    NotYetAvailable,
    /// Retrying the same request will not help.
    Permanent,
    /// The consensus node contradicted an earlier answer or the caller broke ordering rules.
    ProtocolViolation,
    /// This node is not, or may no longer be, the chosen sequencer.
    AuthorityLoss,
    /// The waiter gave up.
    Cancelled,
}

/// Errors produced by consensus client operations.
///
/// `Clone` because a single failure is observed by every caller coalesced onto the failed
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("request queue is full")]
    Overloaded,

    #[error("{0} is not yet available")]
    NotYetAvailable(Resource),

    #[error("batch {batch} unavailable: {reason}")]
    BatchUnavailable { batch: BatchNumber, reason: String },

    #[error("{resource} lookup unavailable: {reason}")]
    LookupUnavailable { resource: Resource, reason: String },

    #[error("conflicting write at position {pos}")]
    ConflictingWrite { pos: MessageIndex },

    #[error("{counter} count went backwards from {previous} to {observed}")]
    NonMonotonicProgress {
        counter: ProgressCounter,
        previous: MessageIndex,
        observed: MessageIndex,
    },

    #[error("{counter} count {observed} is below the observed {bound_counter} count {bound}")]
    ProgressOrderViolation {
        counter: ProgressCounter,
        observed: MessageIndex,
        bound_counter: ProgressCounter,
        bound: MessageIndex,
    },

    /// `expected` is the next position the log would accept, when known.
    #[error("out of order write at position {got}{}", fmt_expected(.expected))]
    OutOfOrderWrite {
        expected: Option<MessageIndex>,
        got: MessageIndex,
    },

    #[error("not the chosen sequencer")]
    NotChosenSequencer,

    #[error("lease must be confirmed with expect_chosen_sequencer before writing")]
    LeaseProbeRequired,

    #[error("outcome of write at position {pos} is unknown")]
    WriteOutcomeUnknown { pos: MessageIndex },

    #[error("wait cancelled")]
    Cancelled,

    #[error("consensus client is shut down")]
    ShutDown,

    #[error("internal: {0}")]
    Internal(String),
}

fn fmt_expected(expected: &Option<MessageIndex>) -> String {
    match expected {
        Some(pos) => format!(" (expected {pos})"),
        None => String::new(),
    }
}

impl ConsensusError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Overloaded => ErrorKind::Transient,
            Self::NotYetAvailable(_) => ErrorKind::NotYetAvailable,
            Self::BatchUnavailable { .. }
            | Self::LookupUnavailable { .. }
            | Self::ConflictingWrite { .. }
            | Self::ShutDown
            | Self::Internal(_) => ErrorKind::Permanent,
            Self::NonMonotonicProgress { .. }
            | Self::ProgressOrderViolation { .. }
            | Self::OutOfOrderWrite { .. } => ErrorKind::ProtocolViolation,
            Self::NotChosenSequencer
            | Self::LeaseProbeRequired
            | Self::WriteOutcomeUnknown { .. } => ErrorKind::AuthorityLoss,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the same request may succeed if simply retried.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether the caller must stop sequencing until the lease is re-confirmed.
    pub fn is_fatal_for_sequencing(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AuthorityLoss | ErrorKind::ProtocolViolation
        )
    }
}

impl From<WaitError> for ConsensusError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Cancelled => Self::Cancelled,
            WaitError::TimedOut(_) => Self::Timeout,
        }
    }
}
