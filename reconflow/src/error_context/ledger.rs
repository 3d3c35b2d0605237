use crate::errors::LastError;
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Prior and current failures of one scope.
///
/// Shared between the runner, the flow executor and the caller, so the
/// current sets use interior mutability.
#[derive(Debug)]
pub struct ErrorContext {
    scope: String,
    prior: BTreeSet<String>,
    failed: Mutex<BTreeSet<String>>,
    resolved: Mutex<BTreeSet<String>>,
}

impl ErrorContext {
    /// Seeds a context with the identifiers that failed last time.
    pub fn new<I, S>(scope: impl Into<String>, prior_failed_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: scope.into(),
            prior: prior_failed_ids.into_iter().map(Into::into).collect(),
            failed: Mutex::new(BTreeSet::new()),
            resolved: Mutex::new(BTreeSet::new()),
        }
    }

    /// Seeds a context from persisted error records; records without a task
    /// identifier are ignored.
    pub fn from_last_errors<'a>(scope: impl Into<String>, last_errors: impl IntoIterator<Item = &'a LastError>) -> Self {
        Self::new(scope, last_errors.into_iter().filter_map(|err| err.task_id.clone()))
    }

    /// Returns the scope name.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the identifiers that failed on the previous attempt.
    #[must_use]
    pub fn prior_ids(&self) -> &BTreeSet<String> {
        &self.prior
    }

    /// Returns true if `id` failed on the previous attempt.
    #[must_use]
    pub fn has_prior_error(&self, id: &str) -> bool {
        self.prior.contains(id)
    }

    /// Records a failure of the current attempt.
    ///
    /// Returns false if `id` was already recorded.
    pub fn add_error_id(&self, id: &str) -> bool {
        self.failed.lock().insert(id.to_string())
    }

    /// Returns true if `id` failed on the current attempt.
    #[must_use]
    pub fn has_error(&self, id: &str) -> bool {
        self.failed.lock().contains(id)
    }

    /// Returns true if anything failed on the current attempt.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.failed.lock().is_empty()
    }

    /// Returns the identifiers to persist for the next attempt.
    #[must_use]
    pub fn failed_ids(&self) -> BTreeSet<String> {
        self.failed.lock().clone()
    }

    /// Records that a previously failed `id` succeeded; other ids are ignored.
    pub fn mark_resolved(&self, id: &str) {
        if self.prior.contains(id) {
            self.resolved.lock().insert(id.to_string());
        }
    }

    /// Returns the prior failures that succeeded on this attempt.
    #[must_use]
    pub fn resolved_ids(&self) -> BTreeSet<String> {
        self.resolved.lock().clone()
    }
}
