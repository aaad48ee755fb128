use std::time::Duration;

use consensus_client_common::RetryConfig;
use serde::Deserialize;

/// Default ms a queried count is served from cache.
const DEFAULT_COUNT_TTL_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncTrackerConfig {
    /// `0` disables caching, every call then queries the consensus node.
    pub count_ttl_ms: u64,
    pub retry: RetryConfig,
}

impl Default for SyncTrackerConfig {
    fn default() -> Self {
        Self {
            count_ttl_ms: DEFAULT_COUNT_TTL_MS,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncTrackerConfig {
    pub(crate) fn count_ttl(&self) -> Duration {
        Duration::from_millis(self.count_ttl_ms)
    }
}
