use std::time::Duration;

use consensus_client_common::RetryConfig;
use serde::Deserialize;

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_WRITE_RETRIES: u16 = 4;
const DEFAULT_RECENT_WRITES_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Writes and probes waiting for the coordinator. Further requests are rejected.
    pub queue_capacity: usize,
    /// Limit on a single write attempt.
    pub write_timeout_ms: u64,
    /// Resubmissions of a write after transport failures.
    pub max_write_retries: u16,
    /// Accepted writes remembered to answer resubmissions locally.
    pub recent_writes_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
            recent_writes_capacity: DEFAULT_RECENT_WRITES_CAPACITY,
        }
    }
}

impl SequencerConfig {
    pub(crate) fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub(crate) fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_write_retries,
            ..RetryConfig::default()
        }
    }
}
