use std::{fmt, sync::Arc};

use consensus_client_common::{
    retry_transient, ConsensusError, ConsensusInfo, ConsensusPromise, MessageCounts,
    MessageIndex, ProgressCounter, RetryConfig, SyncProgressSnapshot, SyncSource, TaskPool,
};
use consensus_client_promise::Promise;
use parking_lot::Mutex;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, debug_span, error, info, trace, Instrument};

use crate::{
    state::{QueryTicket, TrackerState},
    SyncTrackerConfig,
};

/// [`ConsensusInfo`] over a remote [`SyncSource`].
pub struct SyncTracker<S> {
    source: Arc<S>,
    pool: TaskPool,
    config: SyncTrackerConfig,
    state: Arc<Mutex<TrackerState>>,
    finalized_tx: Arc<watch::Sender<Option<MessageIndex>>>,
}

impl<S> fmt::Debug for SyncTracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTracker")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<S: SyncSource + 'static> SyncTracker<S> {
    pub fn new(source: Arc<S>, pool: TaskPool, config: SyncTrackerConfig) -> Self {
        let (finalized_tx, _) = watch::channel(None);
        Self {
            source,
            pool,
            config,
            state: Arc::new(Mutex::new(TrackerState::default())),
            finalized_tx: Arc::new(finalized_tx),
        }
    }

    /// Returns a watcher for the finalized message count, `None` until first observed in the
    /// current session.
    pub fn finality_watcher(&self) -> watch::Receiver<Option<MessageIndex>> {
        self.finalized_tx.subscribe()
    }

    /// Last observed count triple, once all three counts were queried in this session and
    /// their answers are mutually ordered.
    pub fn last_observed(&self) -> Option<MessageCounts> {
        self.state.lock().last_observed()
    }

    fn count(&self, counter: ProgressCounter) -> ConsensusPromise<MessageIndex> {
        let promise = {
            let mut state = self.state.lock();
            if let Some(value) = state.cached(counter, Instant::now(), self.config.count_ttl()) {
                trace!(%counter, %value, "serving cached count");
                return Promise::resolved(value);
            }
            if let Some(pending) = state.pending(counter) {
                return pending;
            }

            let query = CountQuery {
                counter,
                ticket: state.issue(),
                source: Arc::clone(&self.source),
                retry: self.config.retry,
                state: Arc::clone(&self.state),
                finalized_tx: Arc::clone(&self.finalized_tx),
            };
            let span = debug_span!("message_count", component = "sync_tracker", %counter);
            let promise = self.pool.submit(counter.as_str(), query.run().instrument(span));
            state.set_pending(counter, promise.clone());
            promise
        };

        // Registered after unlocking, the continuation runs inline if already settled.
        let state = Arc::clone(&self.state);
        let ours = promise.clone();
        promise.then(move |_| state.lock().clear_pending(counter, &ours));
        promise
    }
}

/// One remote query of a single count, checked against the session's observations.
struct CountQuery<S> {
    counter: ProgressCounter,
    ticket: QueryTicket,
    source: Arc<S>,
    retry: RetryConfig,
    state: Arc<Mutex<TrackerState>>,
    finalized_tx: Arc<watch::Sender<Option<MessageIndex>>>,
}

impl<S: SyncSource + 'static> CountQuery<S> {
    async fn run(self) -> Result<MessageIndex, ConsensusError> {
        let Self {
            counter,
            ticket,
            source,
            retry,
            state,
            finalized_tx,
        } = self;

        let value = retry_transient(counter.as_str(), &retry, || {
            let source = Arc::clone(&source);
            async move { source.message_count(counter).await }
        })
        .await?;

        let recorded = state
            .lock()
            .observe(counter, value, ticket, Instant::now())
            .inspect_err(|err| error!(%err, "consensus node reported inconsistent progress"))?;

        if !recorded {
            debug!(%value, "count from a previous session, not recorded");
        } else if counter == ProgressCounter::Finalized {
            finalized_tx.send_if_modified(|current| {
                let advanced = *current != Some(value);
                *current = Some(value);
                advanced
            });
        }
        Ok(value)
    }
}

impl<S: SyncSource + 'static> ConsensusInfo for SyncTracker<S> {
    fn sync_progress_map(&self) -> ConsensusPromise<SyncProgressSnapshot> {
        let source = Arc::clone(&self.source);
        let retry = self.config.retry;
        let fut = async move {
            retry_transient("sync_progress_map", &retry, || {
                let source = Arc::clone(&source);
                async move { source.sync_progress_map().await }
            })
            .await
        };
        let span = debug_span!("sync_progress_map", component = "sync_tracker");
        self.pool.submit("sync_progress_map", fut.instrument(span))
    }

    fn sync_target_message_count(&self) -> ConsensusPromise<MessageIndex> {
        self.count(ProgressCounter::SyncTarget)
    }

    fn get_safe_msg_count(&self) -> ConsensusPromise<MessageIndex> {
        self.count(ProgressCounter::Safe)
    }

    fn get_finalized_msg_count(&self) -> ConsensusPromise<MessageIndex> {
        self.count(ProgressCounter::Finalized)
    }

    fn start_new_session(&self) {
        let session = {
            let mut state = self.state.lock();
            state.start_new_session();
            state.session()
        };
        self.finalized_tx.send_replace(None);
        info!(%session, "started new sync session");
    }
}
