use std::{future::Future, sync::Arc};

use consensus_client_common::{
    ConsensusError, ConsensusPromise, ConsensusSequencer, MessageIndex, MessageWithMetadata,
    SequencerSink, TaskPool,
};
use consensus_client_promise::Promise;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::warn;

use crate::{
    state::CoordinatorState,
    task::{sequencer_task, SequencerCtx, SequencerRequest},
    SequencerConfig, SequencerStatus,
};

/// Handle to the sequencer coordinator task.
#[derive(Debug, Clone)]
pub struct SequencerCoordinator {
    request_tx: mpsc::Sender<SequencerRequest>,
    status_rx: watch::Receiver<SequencerStatus>,
}

impl SequencerCoordinator {
    /// Returns a watcher for sequencer status updates.
    pub fn status_watcher(&self) -> watch::Receiver<SequencerStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> SequencerStatus {
        self.status_rx.borrow().clone()
    }

    fn enqueue(
        &self,
        request: impl FnOnce(ConsensusPromise<()>) -> SequencerRequest,
    ) -> ConsensusPromise<()> {
        let promise = Promise::new();
        match self.request_tx.try_send(request(promise.clone())) {
            Ok(()) => promise,
            Err(TrySendError::Full(_)) => {
                warn!("sequencer queue full, rejecting request");
                Promise::rejected(ConsensusError::Overloaded)
            }
            Err(TrySendError::Closed(_)) => Promise::rejected(ConsensusError::ShutDown),
        }
    }
}

impl ConsensusSequencer for SequencerCoordinator {
    fn write_message_from_sequencer(
        &self,
        pos: MessageIndex,
        msg: MessageWithMetadata,
    ) -> ConsensusPromise<()> {
        self.enqueue(|promise| SequencerRequest::Write { pos, msg, promise })
    }

    fn expect_chosen_sequencer(&self) -> ConsensusPromise<()> {
        self.enqueue(|promise| SequencerRequest::Probe { promise })
    }
}

/// Builder for the sequencer coordinator.
#[derive(Debug)]
pub struct SequencerBuilder<S> {
    sink: Arc<S>,
    pool: TaskPool,
    config: SequencerConfig,
}

impl<S: SequencerSink + 'static> SequencerBuilder<S> {
    pub fn new(sink: Arc<S>, pool: TaskPool) -> Self {
        Self {
            sink,
            pool,
            config: SequencerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds and returns the coordinator handle and task.
    ///
    /// The task exits once the pool shuts down or every handle is dropped, rejecting
    /// requests still queued with [`ConsensusError::ShutDown`].
    pub fn build(self) -> (SequencerCoordinator, impl Future<Output = ()>) {
        let (request_tx, request_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(SequencerStatus::NotSequencer);
        let handle = SequencerCoordinator {
            request_tx,
            status_rx,
        };

        let shutdown = self.pool.shutdown_token();
        let ctx = SequencerCtx {
            sink: self.sink,
            pool: self.pool,
            retry: self.config.retry(),
            write_timeout: self.config.write_timeout(),
            status_tx,
        };
        let state = CoordinatorState::new(self.config.recent_writes_capacity);
        let task = sequencer_task(request_rx, state, ctx, shutdown);

        (handle, task)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use consensus_client_common::{
        test_utils::{test_message, InMemoryConsensus, RemoteOp},
        MockSequencerSink, PoolConfig,
    };

    use super::*;

    fn idx(v: u64) -> MessageIndex {
        MessageIndex::new(v)
    }

    fn spawn_coordinator<S: SequencerSink + 'static>(
        sink: Arc<S>,
        config: SequencerConfig,
    ) -> (SequencerCoordinator, TaskPool) {
        let pool = TaskPool::from_current(&PoolConfig::default());
        let (coordinator, task) = SequencerBuilder::new(sink, pool.clone())
            .with_config(config)
            .build();
        tokio::spawn(task);
        (coordinator, pool)
    }

    fn leased_node() -> Arc<InMemoryConsensus> {
        let node = Arc::new(InMemoryConsensus::new());
        node.grant_lease();
        node
    }

    #[tokio::test]
    async fn test_identical_resubmission_succeeds_and_different_conflicts() {
        let node = leased_node();
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(1)).await,
            Err(ConsensusError::ConflictingWrite { pos: idx(0) })
        );
        assert_eq!(node.calls(RemoteOp::WriteMessage), 1);
        assert_eq!(node.logged_message(idx(0)), Some(test_message(0)));
    }

    #[tokio::test]
    async fn test_gap_is_rejected_locally() {
        let node = leased_node();
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        assert_eq!(
            seq.write_message_from_sequencer(idx(2), test_message(2)).await,
            Err(ConsensusError::OutOfOrderWrite {
                expected: Some(idx(1)),
                got: idx(2),
            })
        );
        assert_eq!(node.calls(RemoteOp::WriteMessage), 1);
        assert_eq!(node.log_len(), 1);
        assert_eq!(seq.status(), SequencerStatus::Rejected {
            pos: Some(idx(2)),
            reason: ConsensusError::OutOfOrderWrite {
                expected: Some(idx(1)),
                got: idx(2),
            },
        });
    }

    #[tokio::test]
    async fn test_remote_tail_is_learned_from_rejection() {
        let node = leased_node();
        node.seed_log(3);
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        assert_eq!(
            seq.write_message_from_sequencer(idx(5), test_message(5)).await,
            Err(ConsensusError::OutOfOrderWrite {
                expected: Some(idx(3)),
                got: idx(5),
            })
        );
        assert_eq!(
            seq.write_message_from_sequencer(idx(4), test_message(4)).await,
            Err(ConsensusError::OutOfOrderWrite {
                expected: Some(idx(3)),
                got: idx(4),
            })
        );
        assert_eq!(node.calls(RemoteOp::WriteMessage), 1);

        seq.write_message_from_sequencer(idx(3), test_message(3))
            .await
            .unwrap();
        assert_eq!(node.log_len(), 4);
        assert_eq!(seq.status(), SequencerStatus::Confirmed {
            tail: Some(idx(3))
        });
    }

    #[tokio::test]
    async fn test_non_lease_holder_is_rejected() {
        let node = Arc::new(InMemoryConsensus::new());
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(0)).await,
            Err(ConsensusError::NotChosenSequencer)
        );
        assert_eq!(
            seq.expect_chosen_sequencer().await,
            Err(ConsensusError::NotChosenSequencer)
        );
        assert_eq!(node.log_len(), 0);
        assert_eq!(seq.status(), SequencerStatus::Rejected {
            pos: None,
            reason: ConsensusError::NotChosenSequencer,
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_ack_is_resubmitted() {
        let node = leased_node();
        node.lose_next_write_acks(1);
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        assert_eq!(node.calls(RemoteOp::WriteMessage), 2);
        assert_eq!(node.log_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_outcome_requires_lease_probe() {
        let node = leased_node();
        node.fail_next(RemoteOp::WriteMessage, 2);
        let config = SequencerConfig {
            max_write_retries: 1,
            ..Default::default()
        };
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), config);

        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(0)).await,
            Err(ConsensusError::WriteOutcomeUnknown { pos: idx(0) })
        );
        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(0)).await,
            Err(ConsensusError::LeaseProbeRequired)
        );
        assert_eq!(node.calls(RemoteOp::WriteMessage), 2);

        seq.expect_chosen_sequencer().await.unwrap();
        assert_eq!(seq.status(), SequencerStatus::Confirmed { tail: None });
        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        assert_eq!(node.log_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_times_out_as_unknown() {
        let node = leased_node();
        node.set_latency(Duration::from_secs(30));
        let config = SequencerConfig {
            write_timeout_ms: 100,
            max_write_retries: 0,
            ..Default::default()
        };
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), config);

        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(0)).await,
            Err(ConsensusError::WriteOutcomeUnknown { pos: idx(0) })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_rejected_by_saturated_pool_stays_known() {
        let node = leased_node();
        let pool = TaskPool::from_current(&PoolConfig {
            max_concurrent_requests: 1,
            max_queued_requests: 1,
        });
        let config = SequencerConfig {
            max_write_retries: 1,
            ..Default::default()
        };
        let (seq, task) = SequencerBuilder::new(Arc::clone(&node), pool.clone())
            .with_config(config)
            .build();
        tokio::spawn(task);

        // One request holds the only slot and another waits for it.
        let _busy = pool.submit("busy", async {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let _waiting = pool.submit("waiting", async { Ok(()) });
        assert_eq!(pool.queued(), 1);

        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(0)).await,
            Err(ConsensusError::Overloaded)
        );
        assert_eq!(seq.status(), SequencerStatus::Rejected {
            pos: Some(idx(0)),
            reason: ConsensusError::Overloaded,
        });
        // Nothing reached the node, so no lease check is demanded.
        assert_eq!(
            seq.write_message_from_sequencer(idx(0), test_message(0)).await,
            Err(ConsensusError::Overloaded)
        );
        assert_eq!(node.calls(RemoteOp::WriteMessage), 0);
    }

    #[tokio::test]
    async fn test_requests_are_processed_in_submission_order() {
        let node = leased_node();
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        let mut pending = Vec::new();
        for i in 0..3 {
            pending.push(seq.write_message_from_sequencer(idx(i), test_message(i)));
        }
        pending.push(seq.expect_chosen_sequencer());
        for i in 3..6 {
            pending.push(seq.write_message_from_sequencer(idx(i), test_message(i)));
        }

        for promise in pending {
            promise.await.unwrap();
        }
        for i in 0..6 {
            assert_eq!(node.logged_message(idx(i)), Some(test_message(i)));
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_with_overloaded() {
        let node = leased_node();
        let pool = TaskPool::from_current(&PoolConfig::default());
        let config = SequencerConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        let (seq, _task) = SequencerBuilder::new(node, pool).with_config(config).build();

        let queued = seq.expect_chosen_sequencer();
        assert!(!queued.is_settled());
        assert_eq!(
            seq.expect_chosen_sequencer().try_result(),
            Some(Err(ConsensusError::Overloaded))
        );
    }

    #[tokio::test]
    async fn test_shutdown_rejects_queued_and_new_requests() {
        let node = leased_node();
        let pool = TaskPool::from_current(&PoolConfig::default());
        let (seq, task) = SequencerBuilder::new(Arc::clone(&node), pool.clone()).build();

        let queued = seq.write_message_from_sequencer(idx(0), test_message(0));
        pool.shutdown();
        tokio::spawn(task).await.unwrap();

        assert_eq!(queued.await, Err(ConsensusError::ShutDown));
        assert_eq!(
            seq.expect_chosen_sequencer().await,
            Err(ConsensusError::ShutDown)
        );
        assert_eq!(node.log_len(), 0);
    }

    #[tokio::test]
    async fn test_lease_loss_forgets_recent_writes() {
        let node = leased_node();
        let (seq, _pool) = spawn_coordinator(Arc::clone(&node), SequencerConfig::default());

        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        node.revoke_lease();
        assert_eq!(
            seq.write_message_from_sequencer(idx(1), test_message(1)).await,
            Err(ConsensusError::NotChosenSequencer)
        );

        node.grant_lease();
        seq.write_message_from_sequencer(idx(0), test_message(0))
            .await
            .unwrap();
        assert_eq!(node.calls(RemoteOp::WriteMessage), 3);
    }

    #[tokio::test]
    async fn test_definitive_rejection_is_not_retried() {
        let mut sink = MockSequencerSink::new();
        sink.expect_write_message_from_sequencer()
            .times(1)
            .returning(|pos, _| Err(ConsensusError::ConflictingWrite { pos }));
        let (seq, _pool) = spawn_coordinator(Arc::new(sink), SequencerConfig::default());

        assert_eq!(
            seq.write_message_from_sequencer(idx(9), test_message(9)).await,
            Err(ConsensusError::ConflictingWrite { pos: idx(9) })
        );
    }
}
