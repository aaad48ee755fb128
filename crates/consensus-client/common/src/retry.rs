use std::future::Future;

use consensus_common::retry::{
    policies::ExponentialBackoff, retry_with_backoff_async_if, DEFAULT_REMOTE_CALL_MAX_RETRIES,
};
use serde::Deserialize;

use crate::ConsensusError;

/// Retry policy for remote reads and writes, as loaded from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u16,
    pub base_delay_ms: u64,
    /// Growth per attempt in percent, `200` doubles the delay.
    pub multiplier_pct: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_REMOTE_CALL_MAX_RETRIES,
            base_delay_ms: 100,
            multiplier_pct: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_delay_ms, self.multiplier_pct, 100)
            .with_max_delay_ms(self.max_delay_ms)
    }
}

/// Runs `operation`, retrying only [transient](ConsensusError::is_transient) failures.
///
/// Returns the last error once retries are exhausted, so the caller can tell exhaustion
/// (still transient) apart from a definitive answer.
pub async fn retry_transient<T, F, Fut>(
    name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, ConsensusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConsensusError>>,
{
    retry_with_backoff_async_if(
        name,
        config.max_retries,
        &config.backoff(),
        operation,
        ConsensusError::is_transient,
    )
    .await
}
