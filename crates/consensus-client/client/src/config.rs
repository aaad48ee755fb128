use std::{fs, io, path::Path, time::Duration};

use consensus_client_batch_fetcher::BatchFetcherConfig;
use consensus_client_common::PoolConfig;
use consensus_client_sequencer::SequencerConfig;
use consensus_client_sync_tracker::SyncTrackerConfig;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8547";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("unparsable config: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Connection to the consensus node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    /// Limit on a single request, after which it fails as a transient timeout.
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_owned(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration of every consensus client subsystem, one TOML table each.
///
/// ```toml
/// [rpc]
/// url = "http://consensus:8547"
///
/// [sync]
/// count_ttl_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsensusClientConfig {
    pub pool: PoolConfig,
    pub batch_fetcher: BatchFetcherConfig,
    pub sync: SyncTrackerConfig,
    pub sequencer: SequencerConfig,
    pub rpc: RpcConfig,
}

impl ConsensusClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }
}
