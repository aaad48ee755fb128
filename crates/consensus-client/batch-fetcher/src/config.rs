use std::num::NonZeroUsize;

use consensus_client_common::RetryConfig;
use serde::Deserialize;

const DEFAULT_BATCH_CACHE_CAPACITY: usize = 64;
const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchFetcherConfig {
    /// Batches kept in memory. Batches are large, keep this small.
    pub batch_cache_capacity: usize,
    /// Entries kept for each of the two lookup caches.
    pub lookup_cache_capacity: usize,
    pub retry: RetryConfig,
}

impl Default for BatchFetcherConfig {
    fn default() -> Self {
        Self {
            batch_cache_capacity: DEFAULT_BATCH_CACHE_CAPACITY,
            lookup_cache_capacity: DEFAULT_LOOKUP_CACHE_CAPACITY,
            retry: RetryConfig::default(),
        }
    }
}

impl BatchFetcherConfig {
    pub(crate) fn batch_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn lookup_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.lookup_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
