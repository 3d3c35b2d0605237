//! The bounded poller.
//!
//! A probe is invoked until it reports done, reports a fatal error, the
//! context is cancelled or the timeout elapses. Whether an error is transient
//! or fatal is decided by the probe through its [`ProbeOutcome`].

use super::backoff::{IntervalState, PollPolicy};
use crate::context::Context;
use crate::errors::{ContextError, RetryError};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Result of a single probe invocation.
#[derive(Debug)]
pub struct ProbeOutcome {
    done: bool,
    error: Option<anyhow::Error>,
}

impl ProbeOutcome {
    /// Creates an outcome from its raw parts.
    ///
    /// `done` with an error is fatal; not done with an error is transient.
    #[must_use]
    pub fn new(done: bool, error: Option<anyhow::Error>) -> Self {
        Self { done, error }
    }

    /// Returns whether the probe asked to stop polling.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns the error carried by the outcome.
    #[must_use]
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }
}

/// The condition is met; stop polling successfully.
#[must_use]
pub fn ok() -> ProbeOutcome {
    ProbeOutcome::new(true, None)
}

/// The condition is not met yet; poll again.
#[must_use]
pub fn not_ok() -> ProbeOutcome {
    ProbeOutcome::new(false, None)
}

/// A transient error; poll again and remember it.
#[must_use]
pub fn minor_error(err: impl Into<anyhow::Error>) -> ProbeOutcome {
    ProbeOutcome::new(false, Some(err.into()))
}

/// A fatal error; stop polling and return it.
#[must_use]
pub fn severe_error(err: impl Into<anyhow::Error>) -> ProbeOutcome {
    ProbeOutcome::new(true, Some(err.into()))
}

/// A transient error that turns fatal once `attempt` exceeds `threshold`.
#[must_use]
pub fn minor_or_severe_error(attempt: usize, threshold: usize, err: impl Into<anyhow::Error>) -> ProbeOutcome {
    if attempt > threshold {
        severe_error(err)
    } else {
        minor_error(err)
    }
}

/// Marks a task error as fatal for retrying decorators.
///
/// Any other error returned by a task wrapped in
/// [`TaskFn::retry_until_timeout`](crate::flow::TaskFn::retry_until_timeout)
/// is treated as transient.
pub struct SevereError(anyhow::Error);

impl fmt::Debug for SevereError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SevereError").field(&self.0).finish()
    }
}

impl SevereError {
    /// Returns the wrapped error.
    #[must_use]
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }

    /// Borrows the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for SevereError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for SevereError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Wraps an error so retrying decorators stop immediately.
#[must_use]
pub fn severe(err: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(SevereError(err.into()))
}

/// Returns true if the error was marked with [`severe`].
#[must_use]
pub fn is_severe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<SevereError>())
}

/// Removes the [`severe`] marker, returning the original error.
///
/// Errors that were wrapped with context after being marked are returned unchanged.
#[must_use]
pub fn unwrap_severe(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<SevereError>() {
        Ok(severe) => severe.into_inner(),
        Err(err) => err,
    }
}

/// Polls `probe` every `interval` until it is done or `timeout` elapses.
///
/// # Errors
///
/// - the fatal error of a probe that reported done with an error
/// - [`ContextError::Canceled`] as soon as `ctx` is cancelled
/// - [`RetryError`] carrying the last transient error once the timeout is hit,
///   or [`ContextError::DeadlineExceeded`] if the probe never reported one
pub async fn until_timeout<F, Fut>(
    ctx: &Context,
    interval: Duration,
    timeout: Duration,
    probe: F,
) -> anyhow::Result<()>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    poll(ctx.with_timeout(timeout), &PollPolicy::constant(interval, timeout), probe).await
}

/// Polls `probe` every `interval` until it is done or `ctx` ends.
///
/// # Errors
///
/// Same as [`until_timeout`], bounded only by the context.
pub async fn until<F, Fut>(ctx: &Context, interval: Duration, probe: F) -> anyhow::Result<()>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    poll(ctx.child(), &PollPolicy::constant(interval, Duration::MAX), probe).await
}

/// Polls `probe` following `policy` (interval, backoff, jitter and timeout).
///
/// # Errors
///
/// Same as [`until_timeout`].
pub async fn until_with_policy<F, Fut>(ctx: &Context, policy: &PollPolicy, probe: F) -> anyhow::Result<()>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    poll(ctx.with_timeout(policy.timeout()), policy, probe).await
}

async fn poll<F, Fut>(ctx: Context, policy: &PollPolicy, mut probe: F) -> anyhow::Result<()>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    let mut state = IntervalState::new();
    let mut last_error: Option<anyhow::Error> = None;

    loop {
        if let Some(done) = ctx.err() {
            return Err(stopped(done, last_error));
        }

        let outcome = probe(ctx.clone()).await;
        match (outcome.done, outcome.error) {
            (true, None) => return Ok(()),
            (true, Some(err)) => return Err(err),
            (false, err) => {
                let delay = state.next_delay(policy);
                if let Some(err) = err {
                    debug!(
                        attempt = state.attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %format!("{err:#}"),
                        "Retrying after error"
                    );
                    last_error = Some(err);
                }
                if let Err(done) = ctx.sleep(delay).await {
                    return Err(stopped(done, last_error));
                }
            }
        }
    }
}

fn stopped(cause: ContextError, last_error: Option<anyhow::Error>) -> anyhow::Error {
    match (cause, last_error) {
        (ContextError::DeadlineExceeded, Some(last_error)) => {
            anyhow::Error::new(RetryError { cause, last_error })
        }
        (cause, _) => anyhow::Error::new(cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{cancel, is_cancellation, was_canceled};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_until_timeout_eventual_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = until_timeout(
            &Context::new(),
            Duration::from_millis(100),
            Duration::from_secs(1),
            move |_ctx| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt <= 3 {
                        minor_error(anyhow::anyhow!("not ready ({attempt})"))
                    } else {
                        ok()
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_timeout_returns_last_transient_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let err = until_timeout(
            &Context::new(),
            Duration::from_millis(100),
            Duration::from_millis(550),
            move |_ctx| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { minor_error(anyhow::anyhow!("attempt {attempt} failed")) }
            },
        )
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(550));
        assert!(elapsed < Duration::from_millis(650));

        let retry = err.downcast_ref::<RetryError>().expect("retry error");
        assert_eq!(retry.cause, ContextError::DeadlineExceeded);
        let last = calls.load(Ordering::SeqCst);
        assert_eq!(retry.last_error.to_string(), format!("attempt {last} failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_timeout_without_error_reports_deadline() {
        let err = until_timeout(
            &Context::new(),
            Duration::from_millis(10),
            Duration::from_millis(50),
            |_ctx| async { not_ok() },
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<ContextError>(),
            Some(&ContextError::DeadlineExceeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_severe_error_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let err = until_timeout(
            &Context::new(),
            Duration::from_millis(10),
            Duration::from_secs(10),
            move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { severe_error(anyhow::anyhow!("invalid credentials")) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "invalid credentials");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_promptly() {
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.cancel("controller shutting down");
        });

        let start = Instant::now();
        let err = until_timeout(&ctx, Duration::from_secs(60), Duration::from_secs(600), |_ctx| async {
            minor_error(anyhow::anyhow!("still waiting"))
        })
        .await
        .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(is_cancellation(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_runs_without_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        until(&Context::new(), Duration::from_secs(30), move |_ctx| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 50 {
                    not_ok()
                } else {
                    ok()
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 51);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_millisecond_interval_advances_paused_clock() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let err = until_timeout(
            &Context::new(),
            Duration::from_micros(500),
            Duration::from_millis(5),
            move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { not_ok() }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<ContextError>(),
            Some(&ContextError::DeadlineExceeded)
        );
        assert!(calls.load(Ordering::SeqCst) <= 6);
    }

    #[test]
    fn test_minor_or_severe_threshold() {
        assert!(!minor_or_severe_error(2, 3, anyhow::anyhow!("x")).is_done());
        assert!(minor_or_severe_error(4, 3, anyhow::anyhow!("x")).is_done());
    }

    #[test]
    fn test_severe_marker_keeps_sentinel_visible() {
        let err = severe(cancel());
        assert!(is_severe(&err));
        assert!(!is_severe(&anyhow::anyhow!("plain")));
        assert_eq!(err.to_string(), "operation was canceled");
        assert!(was_canceled(&err));
        assert!(is_cancellation(&err.context("step aborted")));

        let err = severe(cancel());
        let inner = unwrap_severe(err);
        assert!(!is_severe(&inner));
        assert!(was_canceled(&inner));
    }
}
