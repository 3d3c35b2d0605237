//! Task functions and their decorators.

use crate::context::Context;
use crate::errors::{is_cancellation, ContextError};
use crate::retry::{self, ProbeOutcome};
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep_until;
use tracing::Instrument;

type BoxedTaskFn = Arc<dyn Fn(Context) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// An opaque unit of work: `Context -> Future<anyhow::Result<()>>`.
///
/// The kernel never looks at what the closure captures. Decorators return a
/// new `TaskFn` wrapping the previous one, so they compose in call order:
///
/// ```rust,ignore
/// let deploy = TaskFn::new(deploy_etcd)
///     .retry_until_timeout(Duration::from_secs(5), Duration::from_secs(120))
///     .do_if(!shoot.hibernated);
/// ```
#[derive(Clone)]
pub struct TaskFn {
    inner: BoxedTaskFn,
    skipped: bool,
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFn")
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

impl TaskFn {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |ctx| f(ctx).boxed()),
            skipped: false,
        }
    }

    /// A function that succeeds immediately.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_ctx| future::ready(Ok(())))
    }

    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::noop()
        }
    }

    /// Returns true if a condition replaced this function with a skip.
    ///
    /// The executor never invokes skipped functions.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Invokes the function.
    pub fn call(&self, ctx: Context) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.inner)(ctx)
    }

    /// Keeps the function only if `condition` holds, otherwise skips it.
    ///
    /// The condition is evaluated now, not when the flow runs.
    #[must_use]
    pub fn do_if(self, condition: bool) -> Self {
        if condition {
            self
        } else {
            Self::skipped()
        }
    }

    /// Skips the function if `condition` holds.
    #[must_use]
    pub fn skip_if(self, condition: bool) -> Self {
        self.do_if(!condition)
    }

    /// Fails with [`ContextError::DeadlineExceeded`] if the function does not
    /// finish within `timeout`.
    ///
    /// The function runs as its own task on a child context that is cancelled
    /// once the decorated call returns. On timeout the work is not aborted:
    /// it keeps running in the background until it notices the cancellation
    /// or finishes on its own.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        if self.skipped {
            return self;
        }
        let inner = self.inner;
        Self::new(move |ctx: Context| {
            let inner = inner.clone();
            async move {
                let child = ctx.with_timeout(timeout);
                let mut work = tokio::spawn(inner(child.clone()).in_current_span());
                let joined = match child.deadline() {
                    Some(deadline) => tokio::select! {
                        biased;
                        joined = &mut work => Some(joined),
                        () = sleep_until(deadline) => None,
                    },
                    None => Some((&mut work).await),
                };
                child.cancel("task finished or timed out");
                match joined {
                    Some(Ok(result)) => result,
                    Some(Err(join_err)) => Err(anyhow::anyhow!("task panicked: {join_err}")),
                    // Dropping the handle detaches the work; it observes the cancelled child.
                    None => Err(ContextError::DeadlineExceeded.into()),
                }
            }
        })
    }

    /// Retries the function every `interval` until it succeeds or `timeout`
    /// elapses.
    ///
    /// Errors marked with [`retry::severe`] and cancellations stop retrying
    /// immediately; every other error is retried. On timeout the last error
    /// is returned inside a [`RetryError`](crate::errors::RetryError).
    #[must_use]
    pub fn retry_until_timeout(self, interval: Duration, timeout: Duration) -> Self {
        if self.skipped {
            return self;
        }
        let inner = self.inner;
        Self::new(move |ctx: Context| {
            let inner = inner.clone();
            async move {
                retry::until_timeout(&ctx, interval, timeout, |ctx| attempt(inner.clone(), ctx)).await
            }
        })
    }

    /// Retries the function every `interval` until it succeeds, bounded only
    /// by the context.
    #[must_use]
    pub fn retry(self, interval: Duration) -> Self {
        if self.skipped {
            return self;
        }
        let inner = self.inner;
        Self::new(move |ctx: Context| {
            let inner = inner.clone();
            async move { retry::until(&ctx, interval, |ctx| attempt(inner.clone(), ctx)).await }
        })
    }

    /// Runs all functions concurrently and waits for every one of them.
    ///
    /// A single failure is returned as is; several are joined.
    #[must_use]
    pub fn parallel(fns: Vec<Self>) -> Self {
        let fns: Arc<[Self]> = fns.into();
        Self::new(move |ctx: Context| {
            let fns = fns.clone();
            async move {
                let results = future::join_all(fns.iter().map(|f| f.call(ctx.clone()))).await;
                let mut errors: Vec<anyhow::Error> = results.into_iter().filter_map(Result::err).collect();
                match errors.len() {
                    0 => Ok(()),
                    1 => Err(errors.remove(0)),
                    _ => Err(JoinedError(errors).into()),
                }
            }
        })
    }

    /// Runs the functions one after another, stopping at the first error.
    #[must_use]
    pub fn sequential(fns: Vec<Self>) -> Self {
        let fns: Arc<[Self]> = fns.into();
        Self::new(move |ctx: Context| {
            let fns = fns.clone();
            async move {
                for f in fns.iter() {
                    f.call(ctx.clone()).await?;
                }
                Ok(())
            }
        })
    }
}

async fn attempt(inner: BoxedTaskFn, ctx: Context) -> ProbeOutcome {
    match inner(ctx).await {
        Ok(()) => retry::ok(),
        Err(err) if retry::is_severe(&err) => retry::severe_error(retry::unwrap_severe(err)),
        Err(err) if is_cancellation(&err) => retry::severe_error(err),
        Err(err) => retry::minor_error(err),
    }
}

/// Errors of several functions run by [`TaskFn::parallel`].
#[derive(Debug)]
pub struct JoinedError(pub Vec<anyhow::Error>);

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred: [", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err:#}")?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for JoinedError {}
