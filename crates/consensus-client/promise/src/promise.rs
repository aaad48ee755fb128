use std::{
    fmt,
    future::{Future, IntoFuture},
    mem,
    pin::{pin, Pin},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{sync::Notify, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::{AlreadySettled, WaitError};

type Continuation<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send + 'static>;

enum State<T, E> {
    Pending(Vec<Continuation<T, E>>),
    Settled(Result<T, E>),
}

struct Shared<T, E> {
    state: Mutex<State<T, E>>,
    settled: Notify,
}

/// Shared handle to an outcome that is produced once and observed by any number of waiters.
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = matches!(*self.shared.state.lock(), State::Settled(_));
        f.debug_struct("Promise")
            .field("settled", &settled)
            .finish_non_exhaustive()
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates an unsettled promise.
    pub fn new() -> Self {
        Self::with_state(State::Pending(Vec::new()))
    }

    /// Creates a promise already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with_state(State::Settled(Ok(value)))
    }

    /// Creates a promise already rejected with `err`.
    pub fn rejected(err: E) -> Self {
        Self::with_state(State::Settled(Err(err)))
    }

    fn with_state(state: State<T, E>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                settled: Notify::new(),
            }),
        }
    }

    pub fn resolve(&self, value: T) -> Result<(), AlreadySettled> {
        self.settle(Ok(value))
    }

    pub fn reject(&self, err: E) -> Result<(), AlreadySettled> {
        self.settle(Err(err))
    }

    /// Settles the promise with `outcome`, waking every waiter and running registered
    /// continuations on the calling thread.
    ///
    /// Fails without touching the stored outcome if the promise was settled before.
    pub fn settle(&self, outcome: Result<T, E>) -> Result<(), AlreadySettled> {
        let (continuations, observed) = {
            let mut state = self.shared.state.lock();
            let continuations = match &mut *state {
                State::Settled(_) => return Err(AlreadySettled),
                State::Pending(continuations) => mem::take(continuations),
            };
            let observed = (!continuations.is_empty()).then(|| outcome.clone());
            *state = State::Settled(outcome);
            (continuations, observed)
        };

        self.shared.settled.notify_waiters();

        if let Some(observed) = observed {
            for continuation in continuations {
                continuation(&observed);
            }
        }
        Ok(())
    }

    /// Registers `f` to observe the outcome.
    ///
    /// Runs immediately on the calling thread if the promise is already settled, otherwise
    /// exactly once on whichever thread settles it. Never runs under the internal lock, so `f`
    /// may freely use this promise or others.
    pub fn then<F>(&self, f: F)
    where
        F: FnOnce(&Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending(continuations) => {
                    continuations.push(Box::new(f));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        f(&outcome);
    }

    /// Chains a transformation of the resolved value into a new promise. Rejections pass
    /// through unchanged.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let mapped = Promise::new();
        let target = mapped.clone();
        self.then(move |outcome| {
            // `target` is private to this chain, so it cannot already be settled.
            let _ = target.settle(outcome.clone().map(f));
        });
        mapped
    }

    /// Returns the outcome if settled, without waiting.
    pub fn try_result(&self) -> Option<Result<T, E>> {
        match &*self.shared.state.lock() {
            State::Settled(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.state.lock(), State::Settled(_))
    }

    /// Whether both handles refer to the same underlying promise.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Waits until the promise settles.
    pub async fn wait(&self) -> Result<T, E> {
        loop {
            let mut notified = pin!(self.shared.settled.notified());
            // Register interest before checking, so a settlement between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            if let Some(outcome) = self.try_result() {
                return outcome;
            }

            notified.await;
        }
    }

    /// Waits until the promise settles or `cancel` fires, whichever happens first.
    ///
    /// An already settled outcome wins over a cancelled token.
    pub async fn wait_or_cancel(&self, cancel: &CancellationToken) -> Result<T, E>
    where
        E: From<WaitError>,
    {
        tokio::select! {
            biased;
            outcome = self.wait() => outcome,
            _ = cancel.cancelled() => Err(WaitError::Cancelled.into()),
        }
    }

    /// Waits at most `limit` for the promise to settle.
    pub async fn wait_timeout(&self, limit: Duration) -> Result<T, E>
    where
        E: From<WaitError>,
    {
        match timeout(limit, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WaitError::TimedOut(limit).into()),
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Boom,
        Wait(WaitError),
    }

    impl From<WaitError> for TestError {
        fn from(err: WaitError) -> Self {
            Self::Wait(err)
        }
    }

    type TestPromise = Promise<u64, TestError>;

    #[test]
    fn test_settles_exactly_once() {
        let promise = TestPromise::new();
        assert!(!promise.is_settled());
        assert_eq!(promise.try_result(), None);

        assert_eq!(promise.resolve(7), Ok(()));
        assert_eq!(promise.resolve(8), Err(AlreadySettled));
        assert_eq!(promise.reject(TestError::Boom), Err(AlreadySettled));

        assert_eq!(promise.try_result(), Some(Ok(7)));
        assert_eq!(promise.clone().try_result(), Some(Ok(7)));
    }

    #[test]
    fn test_then_runs_once_before_and_after_settlement() {
        let calls = Arc::new(AtomicUsize::new(0));
        let promise = TestPromise::new();

        let counter = Arc::clone(&calls);
        promise.then(move |outcome| {
            assert_eq!(outcome, &Err(TestError::Boom));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        promise.reject(TestError::Boom).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Registered after settlement, so it runs synchronously.
        let counter = Arc::clone(&calls);
        promise.then(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let _ = promise.reject(TestError::Boom);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_continuation_can_touch_the_promise() {
        let promise = TestPromise::new();
        let inner = promise.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_inner = Arc::clone(&seen);
        promise.then(move |_| {
            // Would deadlock if continuations ran under the state lock.
            assert!(inner.is_settled());
            seen_inner.store(1, Ordering::SeqCst);
        });
        promise.resolve(1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_map_chains_values_and_passes_errors() {
        let source = TestPromise::new();
        let doubled = source.map(|v| v * 2);
        assert!(!doubled.is_settled());
        source.resolve(21).unwrap();
        assert_eq!(doubled.try_result(), Some(Ok(42)));

        let failed = TestPromise::rejected(TestError::Boom).map(|v| v + 1);
        assert_eq!(failed.try_result(), Some(Err(TestError::Boom)));
    }

    #[test]
    fn test_identity() {
        let a = TestPromise::new();
        let b = a.clone();
        let c = TestPromise::new();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[tokio::test]
    async fn test_all_waiters_see_the_same_value() {
        let promise = TestPromise::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let promise = promise.clone();
                tokio::spawn(async move { promise.await })
            })
            .collect();

        tokio::task::yield_now().await;
        promise.resolve(99).unwrap();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(99));
        }
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_affect_others() {
        let promise = TestPromise::new();
        let token = CancellationToken::new();

        let other = {
            let promise = promise.clone();
            tokio::spawn(async move { promise.wait().await })
        };

        token.cancel();
        assert_eq!(
            promise.wait_or_cancel(&token).await,
            Err(TestError::Wait(WaitError::Cancelled))
        );
        assert!(!promise.is_settled());

        promise.resolve(5).unwrap();
        assert_eq!(other.await.unwrap(), Ok(5));

        // Once settled, the outcome wins over a cancelled token.
        assert_eq!(promise.wait_or_cancel(&token).await, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout() {
        let promise = TestPromise::new();
        let limit = Duration::from_millis(250);
        assert_eq!(
            promise.wait_timeout(limit).await,
            Err(TestError::Wait(WaitError::TimedOut(limit)))
        );

        let settler = promise.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            settler.resolve(3).unwrap();
        });
        assert_eq!(promise.wait_timeout(limit).await, Ok(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_settle_races_with_waiters() {
        for round in 0..64 {
            let promise = TestPromise::new();
            let waiter = {
                let promise = promise.clone();
                tokio::spawn(async move { promise.wait().await })
            };
            let settler = {
                let promise = promise.clone();
                tokio::spawn(async move { promise.resolve(round).unwrap() })
            };
            settler.await.unwrap();
            assert_eq!(waiter.await.unwrap(), Ok(round));
        }
    }
}
