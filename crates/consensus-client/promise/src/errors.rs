use std::time::Duration;

use thiserror::Error;

/// Returned when settling a promise that already holds an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("promise already settled")]
pub struct AlreadySettled;

/// Why a waiter stopped waiting before the promise settled.
///
/// Only the waiter gives up; the promise itself keeps its pending state and still settles for
/// everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("wait cancelled")]
    Cancelled,

    #[error("wait timed out after {0:?}")]
    TimedOut(Duration),
}
