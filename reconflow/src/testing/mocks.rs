//! Instrumented tasks and recorders for testing.

use crate::context::Context;
use crate::errors::cancel;
use crate::flow::{ProgressReporter, TaskFn};
use crate::retry::{self, ProbeOutcome};
use parking_lot::Mutex;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What a [`RecordingTask`] does when called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Return `Ok`.
    Succeed,
    /// Return an error with the message.
    Fail(String),
    /// Return the cancellation sentinel.
    Cancel,
}

/// Start and end of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInterval {
    /// When the call started.
    pub start: Instant,
    /// When the call returned, if it did.
    pub end: Option<Instant>,
}

#[derive(Debug)]
struct Recording {
    behavior: Behavior,
    duration: Duration,
    calls: Mutex<Vec<CallInterval>>,
}

/// A task that records every invocation.
///
/// Clones share the same recording.
#[derive(Debug, Clone)]
pub struct RecordingTask {
    name: String,
    recording: Arc<Recording>,
}

impl RecordingTask {
    /// Creates a task with the given behavior.
    #[must_use]
    pub fn new(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            recording: Arc::new(Recording {
                behavior,
                duration: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A task that succeeds.
    #[must_use]
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::new(name, Behavior::Succeed)
    }

    /// A task that fails with `message`.
    #[must_use]
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Behavior::Fail(message.into()))
    }

    /// A task that returns the cancellation sentinel.
    #[must_use]
    pub fn canceling(name: impl Into<String>) -> Self {
        Self::new(name, Behavior::Cancel)
    }

    /// Makes every call take `duration` before returning.
    ///
    /// Only valid before the task is first cloned.
    #[must_use]
    pub fn with_duration(self, duration: Duration) -> Self {
        let recording = Recording {
            behavior: self.recording.behavior.clone(),
            duration,
            calls: Mutex::new(Vec::new()),
        };
        Self {
            name: self.name,
            recording: Arc::new(recording),
        }
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a task function that records into this task.
    #[must_use]
    pub fn task_fn(&self) -> TaskFn {
        let recording = self.recording.clone();
        TaskFn::new(move |_ctx: Context| {
            let recording = recording.clone();
            async move {
                let index = {
                    let mut calls = recording.calls.lock();
                    calls.push(CallInterval {
                        start: Instant::now(),
                        end: None,
                    });
                    calls.len() - 1
                };
                if !recording.duration.is_zero() {
                    tokio::time::sleep(recording.duration).await;
                }
                recording.calls.lock()[index].end = Some(Instant::now());

                match &recording.behavior {
                    Behavior::Succeed => Ok(()),
                    Behavior::Fail(message) => Err(anyhow::anyhow!("{message}")),
                    Behavior::Cancel => Err(cancel()),
                }
            }
        })
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.recording.calls.lock().len()
    }

    /// Returns every recorded invocation.
    #[must_use]
    pub fn calls(&self) -> Vec<CallInterval> {
        self.recording.calls.lock().clone()
    }

    /// Start of the first invocation.
    #[must_use]
    pub fn first_start(&self) -> Option<Instant> {
        self.recording.calls.lock().first().map(|call| call.start)
    }

    /// End of the last invocation.
    #[must_use]
    pub fn last_end(&self) -> Option<Instant> {
        self.recording.calls.lock().last().and_then(|call| call.end)
    }
}

/// Progress reporter that remembers every call.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct ProgressRecorder {
    reports: Arc<Mutex<Vec<(u8, String)>>>,
}

impl ProgressRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every `(percent, task name)` pair in call order.
    #[must_use]
    pub fn reports(&self) -> Vec<(u8, String)> {
        self.reports.lock().clone()
    }

    /// Returns the reported task names in call order.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        self.reports.lock().iter().map(|(_, name)| name.clone()).collect()
    }
}

impl ProgressReporter for ProgressRecorder {
    fn report(&self, percent: u8, task_name: &str) {
        self.reports.lock().push((percent, task_name.to_string()));
    }
}

/// One scripted probe answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Done.
    Ok,
    /// Not done, no error.
    NotOk,
    /// Not done, transient error with the message.
    Minor(String),
    /// Fatal error with the message.
    Severe(String),
}

/// A poller probe that answers from a script.
///
/// The last answer repeats once the script is exhausted.
#[derive(Debug, Clone)]
pub struct ProbeScript {
    script: Arc<Vec<Scripted>>,
    calls: Arc<Mutex<usize>>,
}

impl ProbeScript {
    /// Creates a probe script; an empty script always answers `NotOk`.
    #[must_use]
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the probe function.
    pub fn probe(&self) -> impl FnMut(Context) -> Ready<ProbeOutcome> + Send + 'static {
        let script = self.script.clone();
        let calls = self.calls.clone();
        move |_ctx| {
            let index = {
                let mut calls = calls.lock();
                *calls += 1;
                *calls - 1
            };
            let answer = script
                .get(index)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or(Scripted::NotOk);
            ready(match answer {
                Scripted::Ok => retry::ok(),
                Scripted::NotOk => retry::not_ok(),
                Scripted::Minor(message) => retry::minor_error(anyhow::anyhow!("{message}")),
                Scripted::Severe(message) => retry::severe_error(anyhow::anyhow!("{message}")),
            })
        }
    }

    /// Returns the number of probe calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}
