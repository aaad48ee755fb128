use std::{fmt, future::Future, sync::Arc};

use consensus_client_common::{
    retry_transient, Batch, BatchFetcher, BatchNumber, BatchSource, ConsensusError,
    ConsensusPromise, L1BlockNumber, MessageIndex, Resource, RetryConfig, TaskPool,
};
use tokio::sync::watch;
use tracing::{debug, debug_span, warn, Instrument, Span};

use crate::{cache::CacheTable, BatchFetcherConfig};

/// Finalized message count as last observed, `None` before the first observation.
pub type FinalityWatermark = watch::Receiver<Option<MessageIndex>>;

/// [`BatchFetcher`] over a remote [`BatchSource`].
///
/// Batches and their base layer blocks never change once posted and are cached as soon as
/// they are fetched. The message to batch mapping is only cached for messages below the
/// finality watermark, since a reorg before finality may move a message to another batch.
pub struct CachingBatchFetcher<S> {
    source: Arc<S>,
    pool: TaskPool,
    retry: RetryConfig,
    batches: CacheTable<BatchNumber, Batch>,
    l1_blocks: CacheTable<BatchNumber, L1BlockNumber>,
    message_batches: CacheTable<MessageIndex, BatchNumber>,
    finality: FinalityWatermark,
}

impl<S> fmt::Debug for CachingBatchFetcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingBatchFetcher")
            .field("retry", &self.retry)
            .field("finalized", &*self.finality.borrow())
            .finish_non_exhaustive()
    }
}

impl<S: BatchSource + 'static> CachingBatchFetcher<S> {
    pub fn new(
        source: Arc<S>,
        pool: TaskPool,
        config: BatchFetcherConfig,
        finality: FinalityWatermark,
    ) -> Self {
        Self {
            source,
            pool,
            retry: config.retry,
            batches: CacheTable::new(config.batch_capacity()),
            l1_blocks: CacheTable::new(config.lookup_capacity()),
            message_batches: CacheTable::new(config.lookup_capacity()),
            finality,
        }
    }

    /// Drops a cached batch so the next fetch goes to the consensus node again.
    pub fn invalidate_batch(&self, batch_num: BatchNumber) {
        debug!(%batch_num, "invalidating cached batch");
        self.batches.purge(&batch_num);
    }

    /// Submits a read to the pool, retrying transient failures.
    ///
    /// Exhausted retries are reported through `unavailable`, every other failure is passed
    /// through as is.
    fn remote_read<T, F, Fut, U>(
        &self,
        op: &'static str,
        span: Span,
        call: F,
        unavailable: U,
    ) -> ConsensusPromise<T>
    where
        T: Clone + Send + 'static,
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ConsensusError>> + Send,
        U: FnOnce(String) -> ConsensusError + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let retry = self.retry;
        let fut = async move {
            let res = retry_transient(op, &retry, || call(Arc::clone(&source))).await;
            res.map_err(|err| {
                if err.is_transient() {
                    warn!(%err, "retries exhausted");
                    unavailable(err.to_string())
                } else {
                    debug!(%err, "remote read failed");
                    err
                }
            })
        };
        self.pool.submit(op, fut.instrument(span))
    }
}

fn is_final(finality: &FinalityWatermark, message: MessageIndex) -> bool {
    matches!(*finality.borrow(), Some(finalized) if message < finalized)
}

impl<S: BatchSource + 'static> BatchFetcher for CachingBatchFetcher<S> {
    fn fetch_batch(&self, batch_num: BatchNumber) -> ConsensusPromise<Batch> {
        self.batches.get_or_fetch(
            batch_num,
            || {
                self.remote_read(
                    "fetch_batch",
                    debug_span!("fetch_batch", component = "batch_fetcher", %batch_num),
                    move |source: Arc<S>| async move { source.fetch_batch(batch_num).await },
                    move |reason| ConsensusError::BatchUnavailable {
                        batch: batch_num,
                        reason,
                    },
                )
            },
            |_| true,
        )
    }

    fn find_l1_batch_for_message(&self, message: MessageIndex) -> ConsensusPromise<BatchNumber> {
        let finality = self.finality.clone();
        self.message_batches.get_or_fetch(
            message,
            || {
                self.remote_read(
                    "find_l1_batch_for_message",
                    debug_span!("find_l1_batch_for_message", component = "batch_fetcher", %message),
                    move |source: Arc<S>| async move {
                        source.find_l1_batch_for_message(message).await
                    },
                    move |reason| ConsensusError::LookupUnavailable {
                        resource: Resource::MessageBatch(message),
                        reason,
                    },
                )
            },
            move |_| is_final(&finality, message),
        )
    }

    fn get_batch_l1_block(&self, batch_num: BatchNumber) -> ConsensusPromise<L1BlockNumber> {
        self.l1_blocks.get_or_fetch(
            batch_num,
            || {
                self.remote_read(
                    "get_batch_l1_block",
                    debug_span!("get_batch_l1_block", component = "batch_fetcher", %batch_num),
                    move |source: Arc<S>| async move { source.get_batch_l1_block(batch_num).await },
                    move |reason| ConsensusError::LookupUnavailable {
                        resource: Resource::BatchL1Block(batch_num),
                        reason,
                    },
                )
            },
            |_| true,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use consensus_client_common::{
        test_utils::{InMemoryConsensus, RemoteOp},
        MockBatchSource, PoolConfig,
    };

    use super::*;

    fn fetcher<S: BatchSource + 'static>(
        source: Arc<S>,
        config: BatchFetcherConfig,
    ) -> (CachingBatchFetcher<S>, watch::Sender<Option<MessageIndex>>) {
        let (finality_tx, finality_rx) = watch::channel(None);
        let pool = TaskPool::from_current(&PoolConfig::default());
        (
            CachingBatchFetcher::new(source, pool, config, finality_rx),
            finality_tx,
        )
    }

    fn node_with_batches(count: u8) -> Arc<InMemoryConsensus> {
        let node = Arc::new(InMemoryConsensus::new());
        for i in 0..count {
            node.push_batch(vec![i; 8], 1_000 + u64::from(i), 10);
        }
        node
    }

    #[tokio::test]
    async fn test_cold_then_warm_fetch() {
        let node = node_with_batches(43);
        let (fetcher, _finality) = fetcher(Arc::clone(&node), BatchFetcherConfig::default());

        let batch = fetcher.fetch_batch(BatchNumber::new(42)).await.unwrap();
        assert_eq!(batch.as_bytes(), &[42; 8]);
        assert_eq!(node.calls(RemoteOp::FetchBatch), 1);

        let warm = fetcher.fetch_batch(BatchNumber::new(42));
        assert!(warm.is_settled());
        assert_eq!(warm.await.unwrap(), batch);
        assert_eq!(node.calls(RemoteOp::FetchBatch), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_share_one_request() {
        let node = node_with_batches(8);
        node.set_latency(Duration::from_millis(20));
        let (fetcher, _finality) = fetcher(Arc::clone(&node), BatchFetcherConfig::default());

        let first = fetcher.fetch_batch(BatchNumber::new(7));
        let second = fetcher.fetch_batch(BatchNumber::new(7));
        assert!(first.same_as(&second));

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(a, b);
        assert_eq!(node.calls(RemoteOp::FetchBatch), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_more_keys_in_flight_than_capacity_still_coalesce() {
        let node = node_with_batches(8);
        node.set_latency(Duration::from_millis(20));
        let config = BatchFetcherConfig {
            batch_cache_capacity: 1,
            ..Default::default()
        };
        let (fetcher, _finality) = fetcher(Arc::clone(&node), config);

        let pending: Vec<_> = (0..3)
            .map(|i| fetcher.fetch_batch(BatchNumber::new(i)))
            .collect();
        let again = fetcher.fetch_batch(BatchNumber::new(0));
        assert!(pending[0].same_as(&again));

        for promise in pending {
            promise.await.unwrap();
        }
        again.await.unwrap();
        assert_eq!(node.calls(RemoteOp::FetchBatch), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let node = node_with_batches(1);
        node.fail_next(RemoteOp::FetchBatch, 2);
        let (fetcher, _finality) = fetcher(Arc::clone(&node), BatchFetcherConfig::default());

        assert!(fetcher.fetch_batch(BatchNumber::new(0)).await.is_ok());
        assert_eq!(node.calls(RemoteOp::FetchBatch), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_not_cached() {
        let node = node_with_batches(1);
        let config = BatchFetcherConfig::default();
        let attempts = u32::from(config.retry.max_retries) + 1;
        node.fail_next(RemoteOp::FetchBatch, attempts);
        let (fetcher, _finality) = fetcher(Arc::clone(&node), config);

        let err = fetcher.fetch_batch(BatchNumber::new(0)).await.unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::BatchUnavailable { batch, .. } if batch == BatchNumber::new(0)
        ));
        assert_eq!(node.calls(RemoteOp::FetchBatch), attempts);

        assert!(fetcher.fetch_batch(BatchNumber::new(0)).await.is_ok());
        assert_eq!(node.calls(RemoteOp::FetchBatch), attempts + 1);
    }

    #[tokio::test]
    async fn test_not_yet_available_is_not_retried_or_cached() {
        let node = node_with_batches(0);
        let (fetcher, _finality) = fetcher(Arc::clone(&node), BatchFetcherConfig::default());

        assert_eq!(
            fetcher.fetch_batch(BatchNumber::new(5)).await,
            Err(ConsensusError::NotYetAvailable(Resource::Batch(
                BatchNumber::new(5)
            )))
        );
        assert_eq!(node.calls(RemoteOp::FetchBatch), 1);

        for i in 0..6u8 {
            node.push_batch(vec![i], 1, 1);
        }
        assert_eq!(
            fetcher.fetch_batch(BatchNumber::new(5)).await.unwrap().as_bytes(),
            &[5]
        );
    }

    #[tokio::test]
    async fn test_message_lookup_cached_only_below_finality() {
        // Batch 0 holds messages 0..10, batch 1 holds 10..20.
        let node = node_with_batches(2);
        let (fetcher, finality) = fetcher(Arc::clone(&node), BatchFetcherConfig::default());
        let msg = MessageIndex::new(3);

        for _ in 0..2 {
            assert_eq!(
                fetcher.find_l1_batch_for_message(msg).await,
                Ok(BatchNumber::new(0))
            );
        }
        assert_eq!(node.calls(RemoteOp::FindL1BatchForMessage), 2);

        finality.send_replace(Some(MessageIndex::new(10)));
        for _ in 0..3 {
            assert_eq!(
                fetcher.find_l1_batch_for_message(msg).await,
                Ok(BatchNumber::new(0))
            );
        }
        assert_eq!(node.calls(RemoteOp::FindL1BatchForMessage), 3);

        // Message 10 is not below the finalized count yet.
        let above = MessageIndex::new(10);
        for _ in 0..2 {
            assert_eq!(
                fetcher.find_l1_batch_for_message(above).await,
                Ok(BatchNumber::new(1))
            );
        }
        assert_eq!(node.calls(RemoteOp::FindL1BatchForMessage), 5);
    }

    #[tokio::test]
    async fn test_l1_block_lookup_is_cached() {
        let mut source = MockBatchSource::new();
        source.expect_fetch_batch().times(0);
        source
            .expect_get_batch_l1_block()
            .times(1)
            .withf(|batch| batch.get() == 7)
            .returning(|_| Ok(L1BlockNumber::new(900)));
        let (fetcher, _finality) = fetcher(Arc::new(source), BatchFetcherConfig::default());

        for _ in 0..3 {
            assert_eq!(
                fetcher.get_batch_l1_block(BatchNumber::new(7)).await,
                Ok(L1BlockNumber::new(900))
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_exhaustion_maps_to_lookup_unavailable() {
        let mut config = BatchFetcherConfig::default();
        config.retry.max_retries = 1;

        let mut source = MockBatchSource::new();
        source
            .expect_get_batch_l1_block()
            .times(2)
            .returning(|_| Err(ConsensusError::transport("connection refused")));
        let (fetcher, _finality) = fetcher(Arc::new(source), config);

        let err = fetcher
            .get_batch_l1_block(BatchNumber::new(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::LookupUnavailable {
                resource: Resource::BatchL1Block(batch),
                ..
            } if batch == BatchNumber::new(3)
        ));
    }

    #[tokio::test]
    async fn test_invalidate_batch_forces_refetch() {
        let node = node_with_batches(1);
        let (fetcher, _finality) = fetcher(Arc::clone(&node), BatchFetcherConfig::default());

        fetcher.fetch_batch(BatchNumber::new(0)).await.unwrap();
        fetcher.invalidate_batch(BatchNumber::new(0));
        fetcher.fetch_batch(BatchNumber::new(0)).await.unwrap();
        assert_eq!(node.calls(RemoteOp::FetchBatch), 2);
    }
}
