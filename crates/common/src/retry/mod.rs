use std::{fmt::Debug, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{error, warn};

pub mod policies;

/// Default number of retries for remote calls made across the consensus boundary.
pub const DEFAULT_REMOTE_CALL_MAX_RETRIES: u16 = 4;

pub trait Backoff {
    /// Base delay in ms.
    fn base_delay_ms(&self) -> u64;

    /// Generates next delay given current delay.
    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64;
}

/// Runs an async fallible operation, retrying with backoff the errors for which
/// `should_retry` returns true. Any other error is returned immediately.
///
/// The operation is attempted at most `max_retries + 1` times. Each retried failure is logged
/// as a warning and exhausting the retries is logged as an error, after which the last error
/// is returned.
///
/// ```rust,no_run
/// use consensus_common::retry::{policies::ExponentialBackoff, retry_with_backoff_async_if};
///
/// async fn poll() -> Result<u64, String> {
///     Err("unreachable".to_string())
/// }
///
/// # async fn run() {
/// let backoff = ExponentialBackoff::new(100, 150, 100);
/// let res = retry_with_backoff_async_if("poll", 3, &backoff, poll, |err| err != "fatal").await;
/// # }
/// ```
pub async fn retry_with_backoff_async_if<R, E, F, Fut, P>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    operation: F,
    should_retry: P,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Debug,
    P: Fn(&E) -> bool,
{
    retry_inner(
        name,
        max_retries,
        backoff,
        operation,
        should_retry,
        sleep,
    )
    .await
}

/// Retry loop generic over the sleep function so tests can record delays.
async fn retry_inner<R, E, F, Fut, P, S, SFut>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    mut operation: F,
    should_retry: P,
    mut sleep_fn: S,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Debug,
    P: Fn(&E) -> bool,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut delay = backoff.base_delay_ms();
    let mut attempt: u16 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !should_retry(&err) {
            return Err(err);
        }

        if attempt >= max_retries {
            error!(%name, attempts = attempt + 1, ?err, "max retries exceeded, returning last error");
            return Err(err);
        }

        attempt += 1;
        warn!(%name, %attempt, ?err, delay_ms = delay, "attempt failed, retrying");
        sleep_fn(Duration::from_millis(delay)).await;
        delay = backoff.next_delay_ms(delay);
    }
}
