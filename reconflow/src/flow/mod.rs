//! Dependency-graph task scheduling.
//!
//! Build a [`Graph`] of [`Task`]s, [`compile`](Graph::compile) it into a
//! [`Flow`] and [`run`](Flow::run) it once per reconciliation attempt.

mod executor;
mod graph;
mod options;
mod progress;
mod task;
mod task_fn;


pub use executor::{RunReport, TaskOutcome, TaskReport};
pub use graph::{Flow, Graph};
pub use options::{ErrorCleaner, FnErrorCleaner, RunOptions};
pub use progress::{LoggingProgressReporter, ProgressReporter};
pub use task::{Task, TaskHandle, TaskHandles};
pub use task_fn::{JoinedError, TaskFn};

#[cfg(test)]
pub use options::MockErrorCleaner;
