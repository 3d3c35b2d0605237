//! Test assertions for recorded tasks and flow errors.

use super::RecordingTask;
use crate::errors::ConsolidatedError;

/// Asserts that `first` finished before `second` started.
pub fn assert_ran_before(first: &RecordingTask, second: &RecordingTask) {
    let end = first.last_end();
    let start = second.first_start();
    assert!(
        matches!((end, start), (Some(end), Some(start)) if end <= start),
        "Expected '{}' (ended {:?}) to finish before '{}' (started {:?})",
        first.name(),
        end,
        second.name(),
        start
    );
}

/// Asserts that the first invocations of both tasks overlapped in time.
pub fn assert_overlapping(a: &RecordingTask, b: &RecordingTask) {
    let first_a = a.calls().first().copied();
    let first_b = b.calls().first().copied();
    let overlapping = match (first_a, first_b) {
        (Some(a), Some(b)) => match (a.end, b.end) {
            (Some(a_end), Some(b_end)) => a.start < b_end && b.start < a_end,
            _ => false,
        },
        _ => false,
    };
    assert!(
        overlapping,
        "Expected '{}' ({:?}) and '{}' ({:?}) to overlap",
        a.name(),
        first_a,
        b.name(),
        first_b
    );
}

/// Asserts that the task was never invoked.
pub fn assert_not_called(task: &RecordingTask) {
    assert_eq!(
        task.call_count(),
        0,
        "Expected '{}' not to be called, but it was called {} times",
        task.name(),
        task.call_count()
    );
}

/// Asserts that the task was invoked exactly once.
pub fn assert_called_once(task: &RecordingTask) {
    assert_eq!(
        task.call_count(),
        1,
        "Expected '{}' to be called once, but it was called {} times",
        task.name(),
        task.call_count()
    );
}

/// Asserts the failed task identifiers, ignoring completion order.
pub fn assert_task_ids(err: &ConsolidatedError, expected: &[&str]) {
    let mut actual = err.task_ids();
    actual.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected failed tasks in: {err}");
}
