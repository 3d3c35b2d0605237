//! Options for a single flow run.

use super::ProgressReporter;
use crate::error_context::ErrorContext;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::Span;

/// Erases a persisted task error once the task succeeds again.
///
/// Called for tasks whose identifier is among the prior failures of the
/// run's [`ErrorContext`], typically to drop the entry from a status object.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorCleaner: Send + Sync {
    /// Removes the stale error recorded for `task_id`.
    async fn clean_error(&self, task_id: &str);
}

/// Adapts a synchronous closure to [`ErrorCleaner`].
pub struct FnErrorCleaner<F>(pub F);

#[async_trait]
impl<F> ErrorCleaner for FnErrorCleaner<F>
where
    F: Fn(&str) + Send + Sync,
{
    async fn clean_error(&self, task_id: &str) {
        (self.0)(task_id);
    }
}

/// Options for [`Flow::run`](super::Flow::run).
#[derive(Clone)]
pub struct RunOptions {
    /// Receives progress after every terminal task transition.
    pub progress_reporter: Option<Arc<dyn ProgressReporter>>,
    /// Ledger of prior and current task failures.
    pub error_context: Option<Arc<ErrorContext>>,
    /// Cleans persisted errors of tasks that recovered.
    pub error_cleaner: Option<Arc<dyn ErrorCleaner>>,
    /// Parent span of the run.
    pub logger: Span,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            progress_reporter: None,
            error_context: None,
            error_cleaner: None,
            logger: Span::none(),
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("progress_reporter", &self.progress_reporter.is_some())
            .field("error_context", &self.error_context)
            .field("error_cleaner", &self.error_cleaner.is_some())
            .field("logger", &self.logger)
            .finish()
    }
}

impl RunOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress reporter.
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress_reporter = Some(Arc::new(reporter));
        self
    }

    /// Sets the error context.
    #[must_use]
    pub fn with_error_context(mut self, error_context: Arc<ErrorContext>) -> Self {
        self.error_context = Some(error_context);
        self
    }

    /// Sets the error cleaner.
    #[must_use]
    pub fn with_error_cleaner(mut self, cleaner: impl ErrorCleaner + 'static) -> Self {
        self.error_cleaner = Some(Arc::new(cleaner));
        self
    }

    /// Sets the parent span.
    #[must_use]
    pub fn with_logger(mut self, logger: Span) -> Self {
        self.logger = logger;
        self
    }
}
