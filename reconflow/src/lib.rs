//! # Reconflow
//!
//! The orchestration kernel for managed-cluster reconciliation.
//!
//! Reconflow provides:
//!
//! - **Flows**: dependency graphs of named tasks, run with maximal concurrency
//! - **Task decorators**: conditional skips, timeouts and retry-until-timeout
//! - **Bounded polling**: probe a condition until it holds, fails or times out
//! - **Resumable error context**: remember which steps failed so the next
//!   attempt can resume them
//! - **Consolidated errors**: one error per failed task, ready to persist
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reconflow::prelude::*;
//!
//! let mut graph = Graph::new("Shoot reconciliation");
//! let infra = graph.add(Task::new("Deploy infrastructure", TaskFn::new(deploy_infra)
//!     .retry_until_timeout(Duration::from_secs(5), Duration::from_secs(600))));
//! let dns = graph.add(Task::new("Deploy DNS record", TaskFn::new(deploy_dns)));
//! graph.add(Task::new("Deploy control plane", TaskFn::new(deploy_control_plane))
//!     .with_dependencies([infra, dns]));
//!
//! let report = graph.compile()?.run(&ctx, RunOptions::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod codes;
pub mod config;
pub mod context;
pub mod error_context;
pub mod errors;
pub mod flow;
pub mod observability;
pub mod retry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::codes::{CodedError, ErrorCode};
    pub use crate::config::{KernelConfig, LogConfig, LogFormat};
    pub use crate::context::Context;
    pub use crate::error_context::{handle_errors, ErrorContext, HandleOutcome, Step, StepStatus};
    pub use crate::errors::{
        cancel, is_cancellation, was_canceled, with_suppressed, ConsolidatedError, ContextError,
        FlowError, GraphValidationError, LastError, RetryError, TaskError,
    };
    pub use crate::flow::{
        ErrorCleaner, Flow, Graph, LoggingProgressReporter, ProgressReporter, RunOptions,
        RunReport, Task, TaskFn, TaskHandle, TaskHandles, TaskOutcome,
    };
    pub use crate::observability::init_tracing;
    pub use crate::retry::{PollPolicy, ProbeOutcome};
}
