//! Flow execution engine.
//!
//! Runs tasks as soon as their dependencies are met, allowing for maximum
//! parallelism. Every task runs on its own tokio task; a single coordinating
//! loop collects completions, updates the pending-dependency counters and
//! launches the tasks that became ready. Nothing else mutates scheduling
//! state.

use super::graph::Flow;
use super::progress::percent;
use super::RunOptions;
use crate::context::Context;
use crate::errors::{is_cancellation, ConsolidatedError, ContextError, FlowError, TaskError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Terminal state of a task after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    /// The function returned `Ok`.
    Succeeded,
    /// The function was replaced by a condition and never invoked.
    Skipped,
    /// The function returned an error or panicked.
    Failed,
    /// The function returned the cancellation sentinel or saw its context cancelled.
    Canceled,
    /// Never started: a dependency failed or the run stopped scheduling.
    NotAttempted,
}

impl TaskOutcome {
    /// Returns true if dependents may run after this outcome.
    #[must_use]
    pub fn releases_dependents(self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

/// Outcome of one task in a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task name.
    pub name: String,
    /// What happened to the task.
    pub outcome: TaskOutcome,
}

/// Summary of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunReport {
    run_id: Uuid,
    flow: String,
    tasks: Vec<TaskReport>,
    duration: Duration,
}

impl RunReport {
    /// Unique id of the run, also recorded on its span.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Name of the flow.
    #[must_use]
    pub fn flow_name(&self) -> &str {
        &self.flow
    }

    /// Per-task outcomes in registration order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskReport] {
        &self.tasks
    }

    /// Wall time of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Outcome of the first task with the given name.
    #[must_use]
    pub fn outcome_of(&self, name: &str) -> Option<TaskOutcome> {
        self.tasks.iter().find(|t| t.name == name).map(|t| t.outcome)
    }

    /// Number of tasks with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: TaskOutcome) -> usize {
        self.tasks.iter().filter(|t| t.outcome == outcome).count()
    }

    /// Returns true if the run stopped early because of a cancellation.
    ///
    /// Callers must check this to tell a clean no-op from a full success.
    #[must_use]
    pub fn was_canceled(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.outcome, TaskOutcome::Canceled | TaskOutcome::NotAttempted))
    }
}

type Completion = (usize, Result<anyhow::Result<()>, JoinError>);

impl Flow {
    /// Runs the flow to completion.
    ///
    /// Failures do not stop independent branches; dependents of a failed task
    /// are never started. Cancelling `ctx` or a task returning the
    /// cancellation sentinel stops scheduling, while running tasks finish.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Tasks`] with one entry per task that failed
    /// - [`FlowError::Context`] if `ctx` passed its deadline before every task ran
    ///
    /// A run that only stopped because of a cancellation returns `Ok` with
    /// [`RunReport::was_canceled`] set.
    pub async fn run(&self, ctx: &Context, options: RunOptions) -> Result<RunReport, FlowError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(parent: &options.logger, "flow", flow = %self.name, %run_id);
        self.execute(ctx, &options, run_id).instrument(span).await
    }

    async fn execute(&self, ctx: &Context, options: &RunOptions, run_id: Uuid) -> Result<RunReport, FlowError> {
        let start = Instant::now();
        let total = self.nodes.len();
        info!(tasks = total, "Starting flow");

        let mut outcomes = vec![TaskOutcome::NotAttempted; total];
        let mut pending: Vec<usize> = self.nodes.iter().map(|node| node.dependencies.len()).collect();
        let mut ready: VecDeque<usize> = (0..total).filter(|&index| pending[index] == 0).collect();
        let mut running = FuturesUnordered::new();
        let mut errors: Vec<TaskError> = Vec::new();
        let mut stopped: Option<ContextError> = None;
        let mut terminal = 0usize;

        loop {
            while let Some(index) = ready.pop_front() {
                if stopped.is_none() {
                    stopped = ctx.err();
                }
                if stopped.is_some() {
                    ready.clear();
                    break;
                }

                let node = &self.nodes[index];
                if node.func.is_skipped() {
                    debug!(task = %node.name, "Task skipped");
                    outcomes[index] = TaskOutcome::Skipped;
                    terminal += 1;
                    self.report_progress(options, terminal, index);
                    self.release(index, &mut pending, &mut ready);
                } else {
                    running.push(self.launch(index, ctx, options));
                }
            }

            let Some((index, joined)) = running.next().await else {
                break;
            };
            let node = &self.nodes[index];

            let outcome = match joined {
                Ok(Ok(())) => {
                    info!(task = %node.name, "Task succeeded");
                    if let Some(error_context) = &options.error_context {
                        error_context.mark_resolved(&node.name);
                    }
                    TaskOutcome::Succeeded
                }
                Ok(Err(err)) if is_cancellation(&err) => {
                    info!(task = %node.name, reason = %err, "Task canceled, no further tasks are started");
                    stopped = Some(ContextError::Canceled);
                    TaskOutcome::Canceled
                }
                Ok(Err(err)) => {
                    warn!(task = %node.name, error = %format!("{err:#}"), "Task failed");
                    errors.push(self.record_failure(options, index, err));
                    TaskOutcome::Failed
                }
                Err(join_err) => {
                    warn!(task = %node.name, error = %join_err, "Task panicked");
                    let err = anyhow::anyhow!("task panicked: {join_err}");
                    errors.push(self.record_failure(options, index, err));
                    TaskOutcome::Failed
                }
            };

            outcomes[index] = outcome;
            terminal += 1;
            self.report_progress(options, terminal, index);
            if outcome.releases_dependents() {
                self.release(index, &mut pending, &mut ready);
            }
        }

        let duration = start.elapsed();
        let not_attempted: Vec<String> = outcomes
            .iter()
            .zip(&self.nodes)
            .filter(|(outcome, _)| **outcome == TaskOutcome::NotAttempted)
            .map(|(_, node)| node.name.clone())
            .collect();

        if !errors.is_empty() {
            warn!(
                failed = errors.len(),
                not_attempted = not_attempted.len(),
                duration_ms = duration_ms(duration),
                "Flow failed"
            );
            return Err(ConsolidatedError::new(self.name.clone(), errors)
                .with_blocked(not_attempted)
                .into());
        }

        if stopped == Some(ContextError::DeadlineExceeded) && !not_attempted.is_empty() {
            warn!(not_attempted = not_attempted.len(), "Flow deadline exceeded");
            return Err(FlowError::Context(ContextError::DeadlineExceeded));
        }

        let report = RunReport {
            run_id,
            flow: self.name.clone(),
            tasks: self
                .nodes
                .iter()
                .zip(outcomes)
                .map(|(node, outcome)| TaskReport {
                    name: node.name.clone(),
                    outcome,
                })
                .collect(),
            duration,
        };
        if report.was_canceled() {
            info!(duration_ms = duration_ms(duration), "Flow canceled");
        } else {
            info!(duration_ms = duration_ms(duration), "Flow succeeded");
        }
        Ok(report)
    }

    /// Spawns the task at `index`; the returned future yields its completion.
    fn launch(&self, index: usize, ctx: &Context, options: &RunOptions) -> impl Future<Output = Completion> {
        let node = &self.nodes[index];
        let name = node.name.clone();
        let func = node.func.clone();
        let ctx = ctx.clone();
        let cleaner = match (&options.error_context, &options.error_cleaner) {
            (Some(error_context), Some(cleaner)) if error_context.has_prior_error(&name) => {
                Some(cleaner.clone())
            }
            _ => None,
        };

        let handle = tokio::spawn(
            async move {
                debug!(task = %name, "Task started");
                func.call(ctx).await?;
                if let Some(cleaner) = cleaner {
                    cleaner.clean_error(&name).await;
                }
                Ok::<_, anyhow::Error>(())
            }
            .in_current_span(),
        );

        async move { (index, handle.await) }
    }

    fn release(&self, index: usize, pending: &mut [usize], ready: &mut VecDeque<usize>) {
        for &dependent in &self.nodes[index].dependents {
            pending[dependent] = pending[dependent].saturating_sub(1);
            if pending[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    fn record_failure(&self, options: &RunOptions, index: usize, err: anyhow::Error) -> TaskError {
        let name = &self.nodes[index].name;
        if let Some(error_context) = &options.error_context {
            error_context.add_error_id(name);
        }
        TaskError::new(name.clone(), err)
    }

    fn report_progress(&self, options: &RunOptions, terminal: usize, index: usize) {
        if let Some(reporter) = &options.progress_reporter {
            reporter.report(percent(terminal, self.nodes.len()), &self.nodes[index].name);
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
