//! Bounded polling and retry primitives.
//!
//! This module provides:
//! - `until` / `until_timeout` pollers driven by a probe function
//! - probe outcome constructors (`ok`, `not_ok`, `minor_error`, `severe_error`)
//! - interval policies with backoff and jitter

mod backoff;
mod poller;

pub use backoff::{BackoffStrategy, IntervalState, JitterStrategy, PollPolicy};
pub use poller::{
    is_severe, minor_error, minor_or_severe_error, not_ok, ok, severe, severe_error, until,
    unwrap_severe, until_timeout, until_with_policy, ProbeOutcome, SevereError,
};
