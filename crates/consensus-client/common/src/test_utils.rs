//! In-memory consensus node for tests.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::{
    Batch, BatchNumber, BatchSource, ConsensusError, L1BlockNumber, L1IncomingMessage,
    L1IncomingMessageHeader, MessageCounts, MessageIndex, MessageWithMetadata, ProgressCounter,
    Resource, SequencerSink, SyncProgressSnapshot, SyncSource,
};

/// Remote calls the double counts and can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchBatch,
    FindL1BatchForMessage,
    GetBatchL1Block,
    SyncProgressMap,
    MessageCount,
    WriteMessage,
    ExpectChosenSequencer,
}

#[derive(Debug, Clone)]
struct StoredBatch {
    data: Batch,
    l1_block: L1BlockNumber,
    first_message: MessageIndex,
    message_count: u64,
}

#[derive(Debug, Default)]
struct State {
    batches: Vec<StoredBatch>,
    counts: MessageCounts,
    progress: SyncProgressSnapshot,
    lease_held: bool,
    log: Vec<MessageWithMetadata>,
    injected_failures: HashMap<RemoteOp, u32>,
    lost_write_acks: u32,
    calls: HashMap<RemoteOp, u32>,
    latency: Duration,
}

/// Consensus node double implementing every remote trait.
///
/// Writes follow the contract of a real node: the lease is checked first, an identical
/// resubmission at an accepted position succeeds, a different one conflicts, and only the
/// position right after the log tail is appended.
#[derive(Debug, Default)]
pub struct InMemoryConsensus {
    state: Mutex<State>,
}

impl InMemoryConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch covering the next `message_count` messages.
    pub fn push_batch(&self, data: impl Into<Batch>, l1_block: u64, message_count: u64) -> BatchNumber {
        let mut state = self.state.lock();
        let first_message = state
            .batches
            .last()
            .map(|b| MessageIndex::new(b.first_message.get() + b.message_count))
            .unwrap_or_default();
        state.batches.push(StoredBatch {
            data: data.into(),
            l1_block: L1BlockNumber::new(l1_block),
            first_message,
            message_count,
        });
        BatchNumber::new(state.batches.len() as u64 - 1)
    }

    pub fn set_count(&self, counter: ProgressCounter, value: u64) {
        self.state.lock().counts.set(counter, MessageIndex::new(value));
    }

    pub fn set_counts(&self, counts: MessageCounts) {
        self.state.lock().counts = counts;
    }

    pub fn set_progress_entry(&self, key: &str, value: serde_json::Value) {
        self.state.lock().progress.insert(key.to_owned(), value);
    }

    pub fn grant_lease(&self) {
        self.state.lock().lease_held = true;
    }

    pub fn revoke_lease(&self) {
        self.state.lock().lease_held = false;
    }

    /// Makes the next `times` calls of `op` fail with a transport error.
    pub fn fail_next(&self, op: RemoteOp, times: u32) {
        *self.state.lock().injected_failures.entry(op).or_default() += times;
    }

    /// Applies the next `times` writes but reports a transport error instead of success.
    pub fn lose_next_write_acks(&self, times: u32) {
        self.state.lock().lost_write_acks += times;
    }

    /// Delay applied to every call before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn calls(&self, op: RemoteOp) -> u32 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn log_len(&self) -> usize {
        self.state.lock().log.len()
    }

    pub fn logged_message(&self, pos: MessageIndex) -> Option<MessageWithMetadata> {
        self.state.lock().log.get(pos.get() as usize).cloned()
    }

    /// Seeds the message log as if another sequencer had written `len` messages.
    pub fn seed_log(&self, len: u64) {
        let mut state = self.state.lock();
        let start = state.log.len() as u64;
        state.log.extend((start..start + len).map(test_message));
    }

    async fn begin(&self, op: RemoteOp) -> Result<(), ConsensusError> {
        let latency = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_default() += 1;
            state.latency
        };
        if !latency.is_zero() {
            sleep(latency).await;
        }

        let mut state = self.state.lock();
        match state.injected_failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ConsensusError::transport(format!("injected {op:?} failure")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BatchSource for InMemoryConsensus {
    async fn fetch_batch(&self, batch_num: BatchNumber) -> Result<Batch, ConsensusError> {
        self.begin(RemoteOp::FetchBatch).await?;
        self.state
            .lock()
            .batches
            .get(batch_num.get() as usize)
            .map(|b| b.data.clone())
            .ok_or(ConsensusError::NotYetAvailable(Resource::Batch(batch_num)))
    }

    async fn find_l1_batch_for_message(
        &self,
        message: MessageIndex,
    ) -> Result<BatchNumber, ConsensusError> {
        self.begin(RemoteOp::FindL1BatchForMessage).await?;
        self.state
            .lock()
            .batches
            .iter()
            .position(|b| {
                message >= b.first_message && message.get() < b.first_message.get() + b.message_count
            })
            .map(|pos| BatchNumber::new(pos as u64))
            .ok_or(ConsensusError::NotYetAvailable(Resource::MessageBatch(message)))
    }

    async fn get_batch_l1_block(
        &self,
        batch_num: BatchNumber,
    ) -> Result<L1BlockNumber, ConsensusError> {
        self.begin(RemoteOp::GetBatchL1Block).await?;
        self.state
            .lock()
            .batches
            .get(batch_num.get() as usize)
            .map(|b| b.l1_block)
            .ok_or(ConsensusError::NotYetAvailable(Resource::BatchL1Block(batch_num)))
    }
}

#[async_trait]
impl SyncSource for InMemoryConsensus {
    async fn sync_progress_map(&self) -> Result<SyncProgressSnapshot, ConsensusError> {
        self.begin(RemoteOp::SyncProgressMap).await?;
        Ok(self.state.lock().progress.clone())
    }

    async fn message_count(
        &self,
        counter: ProgressCounter,
    ) -> Result<MessageIndex, ConsensusError> {
        self.begin(RemoteOp::MessageCount).await?;
        Ok(self.state.lock().counts.get(counter))
    }
}

#[async_trait]
impl SequencerSink for InMemoryConsensus {
    async fn write_message_from_sequencer(
        &self,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> Result<(), ConsensusError> {
        self.begin(RemoteOp::WriteMessage).await?;

        let mut state = self.state.lock();
        if !state.lease_held {
            return Err(ConsensusError::NotChosenSequencer);
        }

        let tail_len = state.log.len() as u64;
        match pos.get() {
            p if p < tail_len => {
                if state.log[p as usize] != msg {
                    return Err(ConsensusError::ConflictingWrite { pos });
                }
            }
            p if p == tail_len => state.log.push(msg),
            _ => {
                return Err(ConsensusError::OutOfOrderWrite {
                    expected: Some(MessageIndex::new(tail_len)),
                    got: pos,
                })
            }
        }

        if state.lost_write_acks > 0 {
            state.lost_write_acks -= 1;
            return Err(ConsensusError::transport("write response lost"));
        }
        Ok(())
    }

    async fn expect_chosen_sequencer(&self) -> Result<(), ConsensusError> {
        self.begin(RemoteOp::ExpectChosenSequencer).await?;
        if self.state.lock().lease_held {
            Ok(())
        } else {
            Err(ConsensusError::NotChosenSequencer)
        }
    }
}

/// Deterministic message whose content depends on `seed`.
pub fn test_message(seed: u64) -> MessageWithMetadata {
    MessageWithMetadata {
        message: L1IncomingMessage {
            header: L1IncomingMessageHeader {
                kind: 3,
                poster: [0xab; 20],
                block_number: 1_000 + seed,
                timestamp: 1_700_000_000 + seed,
                request_id: None,
                l1_base_fee: Some(1_000_000_000),
            },
            l2_msg: Bytes::from(seed.to_be_bytes().to_vec()),
        },
        delayed_messages_read: seed,
    }
}
