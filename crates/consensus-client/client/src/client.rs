use std::{fmt, sync::Arc};

use consensus_client_common::{
    Batch, BatchFetcher, BatchNumber, ConsensusInfo, ConsensusPromise, ConsensusSequencer,
    L1BlockNumber, MessageIndex, MessageWithMetadata, SyncProgressSnapshot, TaskPool,
};
use consensus_client_sequencer::SequencerStatus;
use tokio::sync::watch;
use tracing::info;

/// Consensus client handed to the execution node.
///
/// Cheap to clone. Every clone shares the same caches, sessions and coordinator.
#[derive(Clone)]
pub struct ConsensusClient {
    batches: Arc<dyn BatchFetcher>,
    info: Arc<dyn ConsensusInfo>,
    sequencer: Arc<dyn ConsensusSequencer>,
    sequencer_status: watch::Receiver<SequencerStatus>,
    finality: watch::Receiver<Option<MessageIndex>>,
    pool: TaskPool,
}

impl fmt::Debug for ConsensusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusClient")
            .field("sequencer_status", &*self.sequencer_status.borrow())
            .field("finalized", &*self.finality.borrow())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl ConsensusClient {
    pub(crate) fn new(
        batches: Arc<dyn BatchFetcher>,
        info: Arc<dyn ConsensusInfo>,
        sequencer: Arc<dyn ConsensusSequencer>,
        sequencer_status: watch::Receiver<SequencerStatus>,
        finality: watch::Receiver<Option<MessageIndex>>,
        pool: TaskPool,
    ) -> Self {
        Self {
            batches,
            info,
            sequencer,
            sequencer_status,
            finality,
            pool,
        }
    }

    /// Must be called after reconnecting to a consensus node, which may be behind the
    /// previous one.
    pub fn on_reconnect(&self) {
        self.info.start_new_session();
    }

    /// Stops all work. Pending and future operations reject with `ShutDown`.
    pub fn shutdown(&self) {
        info!("shutting down consensus client");
        self.pool.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    pub fn sequencer_status(&self) -> SequencerStatus {
        self.sequencer_status.borrow().clone()
    }

    /// Returns a watcher for sequencer status updates.
    pub fn sequencer_status_watcher(&self) -> watch::Receiver<SequencerStatus> {
        self.sequencer_status.clone()
    }

    /// Returns a watcher for the finalized message count of the current session.
    pub fn finality_watcher(&self) -> watch::Receiver<Option<MessageIndex>> {
        self.finality.clone()
    }
}

impl BatchFetcher for ConsensusClient {
    fn fetch_batch(&self, batch_num: BatchNumber) -> ConsensusPromise<Batch> {
        self.batches.fetch_batch(batch_num)
    }

    fn find_l1_batch_for_message(&self, message: MessageIndex) -> ConsensusPromise<BatchNumber> {
        self.batches.find_l1_batch_for_message(message)
    }

    fn get_batch_l1_block(&self, batch_num: BatchNumber) -> ConsensusPromise<L1BlockNumber> {
        self.batches.get_batch_l1_block(batch_num)
    }
}

impl ConsensusInfo for ConsensusClient {
    fn sync_progress_map(&self) -> ConsensusPromise<SyncProgressSnapshot> {
        self.info.sync_progress_map()
    }

    fn sync_target_message_count(&self) -> ConsensusPromise<MessageIndex> {
        self.info.sync_target_message_count()
    }

    fn get_safe_msg_count(&self) -> ConsensusPromise<MessageIndex> {
        self.info.get_safe_msg_count()
    }

    fn get_finalized_msg_count(&self) -> ConsensusPromise<MessageIndex> {
        self.info.get_finalized_msg_count()
    }

    fn start_new_session(&self) {
        self.info.start_new_session();
    }
}

impl ConsensusSequencer for ConsensusClient {
    fn write_message_from_sequencer(
        &self,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> ConsensusPromise<()> {
        self.sequencer.write_message_from_sequencer(pos, msg)
    }

    fn expect_chosen_sequencer(&self) -> ConsensusPromise<()> {
        self.sequencer.expect_chosen_sequencer()
    }
}
