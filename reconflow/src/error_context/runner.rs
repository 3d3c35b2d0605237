//! Sequential step runner.

use super::ErrorContext;
use crate::context::Context;
use crate::errors::{is_cancellation, ConsolidatedError, ContextError, TaskError};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

type StepFn<'a> = Box<dyn FnOnce(Context) -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a>;

/// One identified step of a linear sequence.
///
/// Steps may borrow caller state; they run one at a time and are consumed.
pub struct Step<'a> {
    id: String,
    run: StepFn<'a>,
}

impl<'a> Step<'a> {
    /// Creates a step.
    pub fn new<F, Fut>(id: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(Context) -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        Self {
            id: id.into(),
            run: Box::new(move |ctx| f(ctx).boxed()),
        }
    }

    /// Returns the step identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("id", &self.id).finish_non_exhaustive()
    }
}

/// How a step ended, as reported to `on_finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step returned `Ok`.
    Succeeded,
    /// The step returned an error; its id is now in the current failed set.
    Failed,
}

/// Result of a sequence that produced no failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Every step ran and succeeded.
    Completed,
    /// A step returned the cancellation sentinel or the context was cancelled.
    Canceled,
}

impl HandleOutcome {
    /// Returns true if the sequence stopped because of a cancellation.
    #[must_use]
    pub fn was_canceled(self) -> bool {
        self == Self::Canceled
    }
}

/// Runs `steps` strictly in order, continuing past failures.
///
/// Before a step that failed on the previous attempt `on_resume(id)` is
/// called. After each step that did not cancel, `on_finish(id, status)` is
/// called. A cancellation aborts the remaining steps and returns
/// `Ok(HandleOutcome::Canceled)` even if earlier steps failed.
///
/// # Errors
///
/// Returns a [`ConsolidatedError`] scoped to the error context, naming every
/// step that failed on this attempt.
pub async fn handle_errors<'a, R, F>(
    ctx: &Context,
    error_context: &ErrorContext,
    mut on_resume: R,
    mut on_finish: F,
    steps: Vec<Step<'a>>,
) -> Result<HandleOutcome, ConsolidatedError>
where
    R: FnMut(&str),
    F: FnMut(&str, StepStatus),
{
    let mut errors = Vec::new();

    for step in steps {
        if ctx.err() == Some(ContextError::Canceled) {
            info!(scope = error_context.scope(), step = %step.id, "Context canceled, skipping remaining steps");
            return Ok(HandleOutcome::Canceled);
        }

        if error_context.has_prior_error(&step.id) {
            debug!(scope = error_context.scope(), step = %step.id, "Resuming previously failed step");
            on_resume(&step.id);
        }

        let Step { id, run } = step;
        match run(ctx.clone()).await {
            Ok(()) => {
                error_context.mark_resolved(&id);
                on_finish(&id, StepStatus::Succeeded);
            }
            Err(err) if is_cancellation(&err) => {
                info!(scope = error_context.scope(), step = %id, "Step canceled, skipping remaining steps");
                return Ok(HandleOutcome::Canceled);
            }
            Err(err) => {
                warn!(scope = error_context.scope(), step = %id, error = %format!("{err:#}"), "Step failed");
                error_context.add_error_id(&id);
                on_finish(&id, StepStatus::Failed);
                errors.push(TaskError::new(id, err));
            }
        }
    }

    if errors.is_empty() {
        Ok(HandleOutcome::Completed)
    } else {
        Err(ConsolidatedError::new(error_context.scope(), errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::cancel;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn ok_step(id: &str) -> Step<'static> {
        Step::new(id, |_ctx| async { Ok(()) })
    }

    fn failing_step(id: &str) -> Step<'static> {
        let message = format!("{id} is broken");
        Step::new(id, move |_ctx| async move { Err(anyhow::anyhow!(message)) })
    }

    fn steps() -> Vec<Step<'static>> {
        vec![ok_step("A"), failing_step("X"), ok_step("C")]
    }

    #[tokio::test]
    async fn test_continues_past_failures() {
        let error_context = ErrorContext::new("preparation", Vec::<String>::new());
        let mut finished = Vec::new();

        let err = handle_errors(
            &Context::new(),
            &error_context,
            |_| {},
            |id: &str, status| finished.push((id.to_string(), status)),
            steps(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.task_ids(), vec!["X"]);
        assert_eq!(err.scope(), "preparation");
        assert_eq!(
            finished,
            vec![
                ("A".to_string(), StepStatus::Succeeded),
                ("X".to_string(), StepStatus::Failed),
                ("C".to_string(), StepStatus::Succeeded),
            ]
        );
        assert_eq!(error_context.failed_ids(), BTreeSet::from(["X".to_string()]));
    }

    #[tokio::test]
    async fn test_resume_fires_only_for_prior_failures() {
        let first = ErrorContext::new("preparation", Vec::<String>::new());
        let _ = handle_errors(&Context::new(), &first, |_| {}, |_: &str, _| {}, steps()).await;
        let persisted = first.failed_ids();

        let second = ErrorContext::new("preparation", persisted);
        let mut resumed = Vec::new();
        let _ = handle_errors(
            &Context::new(),
            &second,
            |id: &str| resumed.push(id.to_string()),
            |_: &str, _| {},
            steps(),
        )
        .await;

        assert_eq!(resumed, vec!["X".to_string()]);
    }

    #[tokio::test]
    async fn test_resolved_step_clears_ledger() {
        let error_context = ErrorContext::new("preparation", ["X"]);
        let outcome = handle_errors(
            &Context::new(),
            &error_context,
            |_| {},
            |_: &str, _| {},
            vec![ok_step("A"), ok_step("X")],
        )
        .await
        .unwrap();

        assert_eq!(outcome, HandleOutcome::Completed);
        assert!(error_context.failed_ids().is_empty());
        assert_eq!(error_context.resolved_ids(), BTreeSet::from(["X".to_string()]));
    }

    #[tokio::test]
    async fn test_sentinel_aborts_without_error() {
        let error_context = ErrorContext::new("preparation", Vec::<String>::new());
        let mut ran = Vec::new();

        let outcome = handle_errors(
            &Context::new(),
            &error_context,
            |_| {},
            |id: &str, _| ran.push(id.to_string()),
            vec![
                failing_step("A"),
                Step::new("B", |_ctx| async { Err(cancel().context("namespace is gone")) }),
                ok_step("C"),
            ],
        )
        .await
        .unwrap();

        assert!(outcome.was_canceled());
        assert_eq!(ran, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_context_runs_nothing() {
        let ctx = Context::new();
        ctx.cancel("shutdown");
        let error_context = ErrorContext::new("preparation", Vec::<String>::new());
        let mut ran = 0;

        let outcome = handle_errors(&ctx, &error_context, |_| {}, |_: &str, _| ran += 1, steps())
            .await
            .unwrap();

        assert!(outcome.was_canceled());
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn test_steps_may_borrow_caller_state() {
        let mut namespace: Option<String> = None;
        let slot = &mut namespace;
        let error_context = ErrorContext::new("preparation", Vec::<String>::new());

        handle_errors(
            &Context::new(),
            &error_context,
            |_| {},
            |_: &str, _| {},
            vec![Step::new("Retrieve namespace", move |_ctx| async move {
                *slot = Some("shoot--dev--local".to_string());
                Ok(())
            })],
        )
        .await
        .unwrap();

        assert_eq!(namespace.as_deref(), Some("shoot--dev--local"));
    }
}
