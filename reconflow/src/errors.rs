//! Error types for the reconflow kernel.
//!
//! Kernel-level failures are typed with `thiserror`. Task, step and probe
//! failures are opaque [`anyhow::Error`] values; the kernel classifies them
//! by downcasting (cancellation sentinel, context errors, error codes) and
//! never by inspecting messages.

use crate::codes::{error_codes_of, ErrorCode};
use crate::retry::SevereError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for kernel operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The graph could not be compiled.
    #[error("{0}")]
    Validation(#[from] GraphValidationError),

    /// One or more tasks failed.
    #[error("{0}")]
    Tasks(#[from] ConsolidatedError),

    /// The execution context ended the operation.
    #[error("{0}")]
    Context(#[from] ContextError),
}

impl FlowError {
    /// Returns the consolidated task errors, if this is a task failure.
    #[must_use]
    pub fn as_consolidated(&self) -> Option<&ConsolidatedError> {
        match self {
            Self::Tasks(err) => Some(err),
            _ => None,
        }
    }
}

/// Why an execution context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was cancelled.
    #[error("context canceled")]
    Canceled,
    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// The cancellation sentinel.
///
/// A task or step returns it (see [`cancel`]) to stop the run cleanly when
/// there is nothing left to do, e.g. a prerequisite resource is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("operation was canceled")]
pub struct Canceled;

/// Creates the cancellation sentinel as a task error.
#[must_use]
pub fn cancel() -> anyhow::Error {
    anyhow::Error::new(Canceled)
}

/// Visits every cause of `err`, including the ones hidden behind a
/// [`retry::severe`](crate::retry::severe) marker.
pub(crate) fn visit_causes(err: &anyhow::Error, visit: &mut dyn FnMut(&(dyn std::error::Error + 'static))) {
    for cause in err.chain() {
        visit(cause);
        if let Some(marked) = cause.downcast_ref::<SevereError>() {
            visit_causes(marked.inner(), visit);
        }
    }
}

fn any_cause(err: &anyhow::Error, matches: impl Fn(&(dyn std::error::Error + 'static)) -> bool) -> bool {
    let mut found = false;
    visit_causes(err, &mut |cause: &(dyn std::error::Error + 'static)| found |= matches(cause));
    found
}

/// Returns true if the error is (or wraps) the cancellation sentinel.
#[must_use]
pub fn was_canceled(err: &anyhow::Error) -> bool {
    any_cause(err, |cause| cause.is::<Canceled>())
}

/// Returns true if the error is the sentinel or a cancelled context.
///
/// Deadline expiry is a failure, not a cancellation.
#[must_use]
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    any_cause(err, |cause| {
        cause.is::<Canceled>() || cause.downcast_ref::<ContextError>() == Some(&ContextError::Canceled)
    })
}

/// A poller ran out of time while its probe kept reporting transient errors.
#[derive(Debug)]
pub struct RetryError {
    /// Why polling stopped.
    pub cause: ContextError,
    /// The last transient error reported by the probe.
    pub last_error: anyhow::Error,
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retry failed with {}, last error: {:#}", self.cause, self.last_error)
    }
}

impl std::error::Error for RetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.last_error)
    }
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "GRAPH-FOREIGN-HANDLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a graph cannot be compiled into a flow.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// The tasks involved in the error.
    pub tasks: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl GraphValidationError {
    /// Creates a new graph validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the tasks involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the diagnostic code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// The failure of a single task or step, tagged with its identifier.
#[derive(Debug)]
pub struct TaskError {
    /// The persisted identifier of the task (its name).
    pub task_id: String,
    /// The underlying error.
    pub error: anyhow::Error,
}

impl TaskError {
    /// Creates a task error.
    #[must_use]
    pub fn new(task_id: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            task_id: task_id.into(),
            error,
        }
    }

    /// Returns the error codes of the underlying error.
    #[must_use]
    pub fn codes(&self) -> Vec<ErrorCode> {
        error_codes_of(&self.error)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {:?} failed: {:#}", self.task_id, self.error)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.error)
    }
}

/// Aggregate of every directly-failed task of one run.
///
/// Tasks that never ran because an ancestor failed are listed in
/// [`ConsolidatedError::blocked`] for diagnostics but are not errors.
#[derive(Debug)]
pub struct ConsolidatedError {
    scope: String,
    errors: Vec<TaskError>,
    blocked: Vec<String>,
}

impl ConsolidatedError {
    /// Creates a consolidated error for the given flow or step scope.
    #[must_use]
    pub fn new(scope: impl Into<String>, errors: Vec<TaskError>) -> Self {
        Self {
            scope: scope.into(),
            errors,
            blocked: Vec::new(),
        }
    }

    /// Records the tasks that were never attempted.
    #[must_use]
    pub fn with_blocked(mut self, blocked: Vec<String>) -> Self {
        self.blocked = blocked;
        self
    }

    /// Returns the flow or step scope name.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the per-task errors.
    #[must_use]
    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    /// Consumes the error, returning the per-task errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<TaskError> {
        self.errors
    }

    /// Returns the tasks that were blocked by a failed ancestor.
    #[must_use]
    pub fn blocked(&self) -> &[String] {
        &self.blocked
    }

    /// Returns the identifiers of the failed tasks.
    #[must_use]
    pub fn task_ids(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.task_id.as_str()).collect()
    }

    /// Returns the number of failed tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if no task failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the user-facing description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Converts the task errors into records for an external status object.
    #[must_use]
    pub fn last_errors(&self) -> Vec<LastError> {
        self.errors.iter().map(LastError::from_task_error).collect()
    }
}

impl fmt::Display for ConsolidatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow {:?} encountered task errors: [", self.scope)?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for ConsolidatedError {}

/// A persisted failure record, suitable for a status object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    /// Human-readable description.
    pub description: String,
    /// Identifier of the failing task, if the failure belongs to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Classification of the failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<ErrorCode>,
    /// When the failure was recorded.
    pub last_update_time: DateTime<Utc>,
}

impl LastError {
    /// Creates a record without task identifier or codes.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            task_id: None,
            codes: Vec::new(),
            last_update_time: Utc::now(),
        }
    }

    /// Sets the task identifier.
    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Sets the codes.
    #[must_use]
    pub fn with_codes(mut self, codes: Vec<ErrorCode>) -> Self {
        self.codes = codes;
        self
    }

    /// Builds a record from a task error.
    #[must_use]
    pub fn from_task_error(err: &TaskError) -> Self {
        Self::new(err.to_string())
            .with_task_id(err.task_id.clone())
            .with_codes(err.codes())
    }
}

/// An error that also carries a secondary error which happened while
/// handling it, e.g. a failed status update after a failed flow.
#[derive(Debug, Error)]
#[error("{error:#}, suppressed: {suppressed:#}")]
pub struct SuppressedError {
    /// The primary error.
    pub error: anyhow::Error,
    /// The error suppressed while handling the primary one.
    pub suppressed: anyhow::Error,
}

/// Attaches `suppressed` to `err`; returns `err` unchanged if there is none.
#[must_use]
pub fn with_suppressed(err: anyhow::Error, suppressed: Option<anyhow::Error>) -> anyhow::Error {
    match suppressed {
        Some(suppressed) => anyhow::Error::new(SuppressedError {
            error: err,
            suppressed,
        }),
        None => err,
    }
}
