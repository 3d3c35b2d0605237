//! Resumable error context.
//!
//! A ledger of step identifiers that failed on the previous attempt, and a
//! sequential runner that records the failures of the current one. The
//! caller persists [`ErrorContext::failed_ids`] and feeds them back as the
//! prior failures of the next attempt.

mod ledger;
mod runner;

pub use ledger::ErrorContext;
pub use runner::{handle_errors, HandleOutcome, Step, StepStatus};
