//! Batch retrieval with single-flight caching.

mod cache;
mod config;
mod fetcher;

pub use config::BatchFetcherConfig;
pub use fetcher::{CachingBatchFetcher, FinalityWatermark};
