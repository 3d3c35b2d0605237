//! Progress reporting.

use tracing::info;

/// Receives a call after every terminal task transition.
///
/// Implementations must return quickly; they run on the executor's
/// coordinating loop.
pub trait ProgressReporter: Send + Sync {
    /// Reports that `task_name` finished and `percent` of the flow is done.
    fn report(&self, percent: u8, task_name: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, task_name: &str) {
        self(percent, task_name);
    }
}

/// Reporter that logs progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgressReporter;

impl ProgressReporter for LoggingProgressReporter {
    fn report(&self, percent: u8, task_name: &str) {
        info!(percent, task = task_name, "Flow progress");
    }
}

/// Computes `done / total` as a percentage.
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done.min(total) * 100 / total).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_closure_reporter() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = move |percent: u8, name: &str| sink.lock().push((percent, name.to_string()));

        reporter.report(50, "Deploy etcd");
        LoggingProgressReporter.report(100, "Deploy etcd");
        assert_eq!(*seen.lock(), vec![(50, "Deploy etcd".to_string())]);
    }
}
