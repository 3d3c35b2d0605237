//! Execution context shared by flows, decorators and pollers.
//!
//! A [`Context`] couples a [`CancellationToken`](crate::cancellation::CancellationToken)
//! with an optional deadline. Contexts form a tree: timeouts and child runs
//! derive new contexts that are cancelled together with their parent.

mod execution;

pub use execution::Context;
