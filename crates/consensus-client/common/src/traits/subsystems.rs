use crate::{
    Batch, BatchNumber, ConsensusPromise, L1BlockNumber, MessageIndex, MessageWithMetadata,
    SyncProgressSnapshot,
};

/// Maps sequencing positions to batches and their base layer anchoring.
///
/// Every call returns immediately. Answers that can no longer change are served from cache,
/// and concurrent calls for the same key share one request.
pub trait BatchFetcher: Send + Sync {
    /// Bytes of batch `batch_num`.
    fn fetch_batch(&self, batch_num: BatchNumber) -> ConsensusPromise<Batch>;

    /// The batch that contains message `message`.
    fn find_l1_batch_for_message(&self, message: MessageIndex) -> ConsensusPromise<BatchNumber>;

    /// Base layer block that batch `batch_num` was posted in.
    fn get_batch_l1_block(&self, batch_num: BatchNumber) -> ConsensusPromise<L1BlockNumber>;
}

/// Sync progress of the consensus node.
///
/// Counts are pulled on demand. Within a session they never decrease and always satisfy
/// `finalized <= safe <= target`.
pub trait ConsensusInfo: Send + Sync {
    fn sync_progress_map(&self) -> ConsensusPromise<SyncProgressSnapshot>;

    /// Number of messages the consensus node wants the execution side to reach.
    fn sync_target_message_count(&self) -> ConsensusPromise<MessageIndex>;

    fn get_safe_msg_count(&self) -> ConsensusPromise<MessageIndex>;

    fn get_finalized_msg_count(&self) -> ConsensusPromise<MessageIndex>;

    /// Forgets previous observations, e.g. after reconnecting to a different consensus node.
    ///
    /// Counts may start lower afterwards without being treated as a regression.
    fn start_new_session(&self);
}

/// Single-writer access to the message log for the chosen sequencer.
pub trait ConsensusSequencer: Send + Sync {
    /// Appends `msg` at `pos`. Success means the consensus node durably accepted it.
    ///
    /// Writing the identical message at an already accepted position succeeds again.
    fn write_message_from_sequencer(
        &self,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> ConsensusPromise<()>;

    /// Succeeds if this node currently holds the sequencer lease.
    fn expect_chosen_sequencer(&self) -> ConsensusPromise<()>;
}

/// Everything an execution node needs from its consensus counterpart.
pub trait FullConsensusClient: BatchFetcher + ConsensusInfo + ConsensusSequencer {}

impl<T> FullConsensusClient for T where T: BatchFetcher + ConsensusInfo + ConsensusSequencer {}
