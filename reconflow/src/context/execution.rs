//! The execution context handed to every task, step and probe.

use crate::cancellation::CancellationToken;
use crate::errors::ContextError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

/// A cloneable, cancellation-aware execution context.
///
/// Cancellation is cooperative: the kernel never aborts a running task, it
/// only flips the token and wakes anything parked in [`Context::done`].
/// Tasks that never look at their context may outlive a timeout.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: Arc<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a root context without deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root context driven by an existing token.
    #[must_use]
    pub fn from_token(token: Arc<CancellationToken>) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Returns the cancellation token of this context.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left until the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Derives a context that can be cancelled without affecting this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context that expires after `timeout`.
    ///
    /// A timeout too large to be represented yields a child without a new deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derives a child context that expires at `deadline`.
    ///
    /// An earlier deadline inherited from this context is kept.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns why the context is done, or `None` while it is still live.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Completes when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => ContextError::Canceled,
                () = sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }

    /// Sleeps for `duration` unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns the context error if the context is done before the sleep ends.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            () = sleep(duration) => Ok(()),
        }
    }
}
