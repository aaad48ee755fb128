use std::sync::Arc;

use consensus_client_batch_fetcher::CachingBatchFetcher;
use consensus_client_common::{BatchSource, ConsensusError, SequencerSink, SyncSource, TaskPool};
use consensus_client_sequencer::SequencerBuilder;
use consensus_client_sync_tracker::SyncTracker;
use tokio::runtime::Handle;
use tracing::info;

use crate::{ConsensusClient, ConsensusClientConfig, RpcConsensusRemote};

/// Builder for creating a [`ConsensusClient`].
#[derive(Debug)]
pub struct ConsensusClientBuilder {
    config: ConsensusClientConfig,
    runtime: Option<Handle>,
}

impl ConsensusClientBuilder {
    pub fn new(config: ConsensusClientConfig) -> Self {
        Self {
            config,
            runtime: None,
        }
    }

    /// Sets the runtime remote work is spawned on. Defaults to the current one.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds a client over the consensus node at the configured RPC url.
    ///
    /// # Panics
    ///
    /// If no runtime was set and this is called outside of a tokio runtime.
    pub fn connect(self) -> Result<ConsensusClient, ConsensusError> {
        let remote = RpcConsensusRemote::try_new(&self.config.rpc)?;
        Ok(self.build(Arc::new(remote)))
    }

    /// Builds a client over `remote` and starts the sequencer coordinator.
    ///
    /// # Panics
    ///
    /// If no runtime was set and this is called outside of a tokio runtime.
    pub fn build<R>(self, remote: Arc<R>) -> ConsensusClient
    where
        R: BatchSource + SyncSource + SequencerSink + 'static,
    {
        let config = self.config;
        let pool = match self.runtime {
            Some(handle) => TaskPool::new(handle, &config.pool),
            None => TaskPool::from_current(&config.pool),
        };

        let tracker = SyncTracker::new(Arc::clone(&remote), pool.clone(), config.sync);
        let finality = tracker.finality_watcher();
        let fetcher = CachingBatchFetcher::new(
            Arc::clone(&remote),
            pool.clone(),
            config.batch_fetcher,
            finality.clone(),
        );

        let (coordinator, task) = SequencerBuilder::new(remote, pool.clone())
            .with_config(config.sequencer)
            .build();
        let sequencer_status = coordinator.status_watcher();
        // Detached, the task exits on its own once the pool shuts down.
        let _ = pool.spawn_service("sequencer_coordinator", task);

        info!(
            max_concurrent_requests = config.pool.max_concurrent_requests,
            count_ttl_ms = config.sync.count_ttl_ms,
            "consensus client started"
        );

        ConsensusClient::new(
            Arc::new(fetcher),
            Arc::new(tracker),
            Arc::new(coordinator),
            sequencer_status,
            finality,
            pool,
        )
    }
}
