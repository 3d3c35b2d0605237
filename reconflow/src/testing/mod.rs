//! Testing utilities for reconflow flows.
//!
//! This module provides:
//! - Instrumented tasks that record when they ran
//! - A progress recorder and a scripted poller probe
//! - Ordering and overlap assertions

mod assertions;
mod mocks;

pub use assertions::{
    assert_called_once, assert_not_called, assert_overlapping, assert_ran_before,
    assert_task_ids,
};
pub use mocks::{Behavior, CallInterval, ProbeScript, ProgressRecorder, RecordingTask, Scripted};
