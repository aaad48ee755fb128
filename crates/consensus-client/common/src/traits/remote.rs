use async_trait::async_trait;

use crate::{
    Batch, BatchNumber, ConsensusError, L1BlockNumber, MessageIndex, MessageWithMetadata,
    ProgressCounter, SyncProgressSnapshot,
};

/// Remote side of batch retrieval. One call is one request to the consensus node.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait BatchSource: Send + Sync {
    async fn fetch_batch(&self, batch_num: BatchNumber) -> Result<Batch, ConsensusError>;

    async fn find_l1_batch_for_message(
        &self,
        message: MessageIndex,
    ) -> Result<BatchNumber, ConsensusError>;

    async fn get_batch_l1_block(
        &self,
        batch_num: BatchNumber,
    ) -> Result<L1BlockNumber, ConsensusError>;
}

/// Remote side of sync progress queries.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn sync_progress_map(&self) -> Result<SyncProgressSnapshot, ConsensusError>;

    async fn message_count(&self, counter: ProgressCounter)
        -> Result<MessageIndex, ConsensusError>;
}

/// Remote side of sequencer writes.
///
/// Implementations must treat an identical resubmission at an accepted position as success.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait SequencerSink: Send + Sync {
    async fn write_message_from_sequencer(
        &self,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> Result<(), ConsensusError>;

    async fn expect_chosen_sequencer(&self) -> Result<(), ConsensusError>;
}
