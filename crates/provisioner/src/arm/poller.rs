//! Long-running operation handles and polling policy.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ArmError;

/// Default interval between status polls, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS);

/// Default number of retries for a transient poll failure.
pub const DEFAULT_POLL_MAX_RETRIES: u32 = 5;

/// How long-running operations are polled.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay between polls when the service sends no `Retry-After`.
    pub interval: Duration,
    /// Give up after this long. `None` waits until cancelled.
    pub timeout: Option<Duration>,
    /// Retries for a transient error on a single poll.
    pub max_retries: u32,
    /// First backoff delay after a transient error.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            max_retries: DEFAULT_POLL_MAX_RETRIES,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl PollPolicy {
    /// Policy with the given poll interval and default retry settings.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Handle to a submitted long-running operation.
///
/// Nothing is polled until [`wait`](Self::wait) is awaited.
pub struct Poller<T> {
    operation: String,
    timeout: Option<Duration>,
    future: BoxFuture<'static, Result<T, ArmError>>,
}

impl<T: Send + 'static> Poller<T> {
    /// Wrap a future that drives the operation to completion.
    pub fn new<F>(operation: impl Into<String>, timeout: Option<Duration>, future: F) -> Self
    where
        F: Future<Output = Result<T, ArmError>> + Send + 'static,
    {
        Self {
            operation: operation.into(),
            timeout,
            future: future.boxed(),
        }
    }

    /// An operation that has already finished.
    pub fn done(operation: impl Into<String>, result: Result<T, ArmError>) -> Self {
        Self::new(operation, None, futures::future::ready(result))
    }

    /// Operation description used in logs and errors.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Poll until the operation reaches a terminal state.
    ///
    /// # Errors
    /// Returns the operation's error, [`ArmError::Cancelled`] if `cancel`
    /// fires first, or [`ArmError::Timeout`] if the policy timeout elapses.
    pub async fn wait(self, cancel: &CancellationToken) -> Result<T, ArmError> {
        let Self {
            operation,
            timeout,
            future,
        } = self;

        debug!(operation = %operation, "Waiting for long-running operation");

        let bounded = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, future).await {
                    Ok(result) => result,
                    Err(_) => Err(ArmError::Timeout {
                        operation: operation.clone(),
                        secs: limit.as_secs(),
                    }),
                },
                None => future.await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(operation = %operation, "Long-running operation wait cancelled");
                Err(ArmError::Cancelled(operation.clone()))
            }
            result = bounded => result,
        }
    }
}

/// Run one poll request, retrying transient failures with exponential
/// backoff.
///
/// # Errors
/// Returns the first non-transient error, or the last transient error once
/// `policy.max_retries` is exhausted.
pub async fn retry_transient<T, F, Fut>(
    policy: &PollPolicy,
    operation_name: &str,
    mut f: F,
) -> Result<T, ArmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ArmError>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_backoff;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                info!(
                    "{operation_name} poll failed (retry {attempt}/{}): {e}. Retrying in {delay:?}...",
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(
                    policy.max_backoff,
                    Duration::from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier),
                );
            }
            Err(e) => return Err(e),
        }
    }
}
