//! Shared execution pool for remote requests.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use consensus_client_promise::Promise;
use futures::FutureExt;
use serde::Deserialize;
use tokio::{runtime::Handle, sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{ConsensusError, ConsensusPromise};

/// Default cap on remote requests running at once.
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Default cap on admitted requests waiting for a concurrency slot.
const DEFAULT_MAX_QUEUED_REQUESTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_concurrent_requests: usize,
    pub max_queued_requests: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_queued_requests: DEFAULT_MAX_QUEUED_REQUESTS,
        }
    }
}

#[derive(Debug)]
struct PoolInner {
    handle: Handle,
    permits: Semaphore,
    queued: AtomicUsize,
    max_queued: usize,
    shutdown: CancellationToken,
}

/// Runs remote work for every subsystem of one consensus client.
///
/// Concurrency is bounded by a semaphore. Requests waiting for a slot are bounded too, and
/// once that limit is hit new requests are rejected with [`ConsensusError::Overloaded`]
/// instead of piling up.
#[derive(Debug, Clone)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

impl TaskPool {
    pub fn new(handle: Handle, config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                handle,
                permits: Semaphore::new(config.max_concurrent_requests.max(1)),
                queued: AtomicUsize::new(0),
                max_queued: config.max_queued_requests.max(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Creates a pool on the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// If called outside of a tokio runtime.
    pub fn from_current(config: &PoolConfig) -> Self {
        Self::new(Handle::current(), config)
    }

    /// Spawns `fut` and returns a promise for its outcome.
    ///
    /// The promise always settles: with the output, with [`ConsensusError::Internal`] if the
    /// future panics, or with [`ConsensusError::ShutDown`] if the pool shuts down first.
    pub fn submit<T, F>(&self, op: &'static str, fut: F) -> ConsensusPromise<T>
    where
        T: Clone + Send + 'static,
        F: Future<Output = Result<T, ConsensusError>> + Send + 'static,
    {
        if let Err(err) = self.reserve(op) {
            return Promise::rejected(err);
        }

        let promise = Promise::new();
        let guard = SettleOnDrop(Some(promise.clone()));
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            let outcome = inner.execute(op, fut).await;
            guard.settle(outcome);
        });
        promise
    }

    /// Runs `fut` inline on the caller's task, subject to the same limits as [`Self::submit`].
    pub async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, ConsensusError>
    where
        F: Future<Output = Result<T, ConsensusError>> + Send,
    {
        self.reserve(op)?;
        self.inner.execute(op, fut).await
    }

    /// Spawns a long running task that is not subject to request limits.
    ///
    /// The task is expected to watch [`Self::shutdown_token`] and exit on its own.
    pub fn spawn_service<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.handle.spawn(async move {
            debug!(%name, "service started");
            fut.await;
            debug!(%name, "service exited");
        })
    }

    /// Token cancelled when the pool shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Rejects queued and future requests and aborts running ones with
    /// [`ConsensusError::ShutDown`].
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("shutting down consensus task pool");
        }
        self.inner.shutdown.cancel();
        self.inner.permits.close();
    }

    /// Requests admitted but still waiting for a concurrency slot.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    fn reserve(&self, op: &'static str) -> Result<(), ConsensusError> {
        if self.is_shut_down() {
            return Err(ConsensusError::ShutDown);
        }
        let queued = self.inner.queued.fetch_add(1, Ordering::AcqRel);
        if queued >= self.inner.max_queued {
            self.inner.queued.fetch_sub(1, Ordering::AcqRel);
            warn!(%op, %queued, "request queue full, rejecting");
            return Err(ConsensusError::Overloaded);
        }
        Ok(())
    }
}

impl PoolInner {
    async fn execute<T, F>(&self, op: &'static str, fut: F) -> Result<T, ConsensusError>
    where
        F: Future<Output = Result<T, ConsensusError>>,
    {
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            permit = self.permits.acquire() => permit.ok(),
        };
        self.queued.fetch_sub(1, Ordering::AcqRel);
        let Some(_permit) = permit else {
            return Err(ConsensusError::ShutDown);
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ConsensusError::ShutDown),
            outcome = AssertUnwindSafe(fut).catch_unwind() => outcome.unwrap_or_else(|_| {
                error!(%op, "pooled request panicked");
                Err(ConsensusError::internal(format!("{op} panicked")))
            }),
        }
    }
}

/// Rejects the promise with [`ConsensusError::ShutDown`] if the owning task is dropped
/// before settling it, which happens when the runtime shuts down.
struct SettleOnDrop<T: Clone + Send + 'static>(Option<ConsensusPromise<T>>);

impl<T: Clone + Send + 'static> SettleOnDrop<T> {
    fn settle(mut self, outcome: Result<T, ConsensusError>) {
        if let Some(promise) = self.0.take() {
            let _ = promise.settle(outcome);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for SettleOnDrop<T> {
    fn drop(&mut self) {
        if let Some(promise) = self.0.take() {
            let _ = promise.reject(ConsensusError::ShutDown);
        }
    }
}
