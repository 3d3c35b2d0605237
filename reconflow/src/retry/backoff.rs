//! Interval policies for the poller.
//!
//! Provides constant, linear and exponential intervals with optional jitter.
//! The plain `until`/`until_timeout` pollers use a constant interval without
//! jitter; [`PollPolicy`] lets callers opt into backoff.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base (constant)
    #[default]
    Constant,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base * 2^attempt
    Exponential,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Base interval between attempts in milliseconds.
    pub interval_ms: u64,
    /// Overall timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum interval cap in milliseconds.
    pub max_interval_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            timeout_ms: 600_000,
            max_interval_ms: 60_000,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

impl PollPolicy {
    /// Creates a constant-interval policy without jitter.
    #[must_use]
    pub fn constant(interval: Duration, timeout: Duration) -> Self {
        let interval_ms = interval_ms(interval);
        Self {
            interval_ms,
            timeout_ms: duration_ms(timeout),
            max_interval_ms: interval_ms,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the base interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval_ms(interval);
        self
    }

    /// Sets the overall timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the maximum interval.
    #[must_use]
    pub fn with_max_interval(mut self, max: Duration) -> Self {
        self.max_interval_ms = duration_ms(max);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Returns the base interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the overall timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Shortest delay between two attempts. Polling never spins.
const MIN_DELAY_MS: u64 = 1;

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn interval_ms(d: Duration) -> u64 {
    duration_ms(d).max(MIN_DELAY_MS)
}

/// Interval state of one polling loop.
#[derive(Debug, Default)]
pub struct IntervalState {
    /// Current attempt number (0-indexed).
    pub attempt: u32,
    /// Previous delay for decorrelated jitter.
    previous_delay: Option<u64>,
}

impl IntervalState {
    /// Creates a new interval state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the delay after the current attempt and advances the counter.
    pub fn next_delay(&mut self, policy: &PollPolicy) -> Duration {
        let delay = self.calculate_delay(policy);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Calculates the delay for the current attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, policy: &PollPolicy) -> Duration {
        let base = policy.interval_ms;
        let max = policy.max_interval_ms.max(base);

        let delay = match policy.backoff {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(self.attempt)).min(max)
            }
            BackoffStrategy::Linear => {
                base.saturating_mul(u64::from(self.attempt) + 1).min(max)
            }
            BackoffStrategy::Constant => base,
        };

        let jittered = match policy.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let next = if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delay = Some(next);
                next
            }
        };

        Duration::from_millis(jittered.max(MIN_DELAY_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sub_millisecond_interval_never_yields_zero_delay() {
        let policy = PollPolicy::constant(Duration::from_micros(500), Duration::from_millis(5));
        assert_eq!(policy.interval(), Duration::from_millis(1));

        let zero = PollPolicy {
            interval_ms: 0,
            jitter: JitterStrategy::Full,
            ..PollPolicy::default()
        };
        let mut state = IntervalState::new();
        for _ in 0..20 {
            assert!(state.next_delay(&zero) >= Duration::from_millis(1));
        }
    }

    #[test]
    fn test_policy_defaults() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(5));
        assert_eq!(policy.timeout(), Duration::from_secs(600));
        assert_eq!(policy.backoff, BackoffStrategy::Constant);
        assert_eq!(policy.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_constant_policy() {
        let policy = PollPolicy::constant(Duration::from_millis(100), Duration::from_secs(1));
        let mut state = IntervalState::new();

        for _ in 0..5 {
            assert_eq!(state.next_delay(&policy), Duration::from_millis(100));
        }
        assert_eq!(state.attempt, 5);
    }

    #[test]
    fn test_exponential_capped_at_max() {
        let policy = PollPolicy::default()
            .with_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(500))
            .with_backoff(BackoffStrategy::Exponential);
        let mut state = IntervalState::new();

        let delays: Vec<_> = (0..5).map(|_| state.next_delay(&policy).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = PollPolicy::default()
            .with_interval(Duration::from_millis(100))
            .with_backoff(BackoffStrategy::Linear);
        let mut state = IntervalState::new();

        let delays: Vec<_> = (0..3).map(|_| state.next_delay(&policy).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 300]);
    }

    #[test]
    fn test_full_jitter_bounded() {
        let policy = PollPolicy::constant(Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(JitterStrategy::Full);
        let mut state = IntervalState::new();

        for _ in 0..20 {
            assert!(state.calculate_delay(&policy) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_decorrelated_jitter_within_range() {
        let policy = PollPolicy::default()
            .with_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(1_000))
            .with_jitter(JitterStrategy::Decorrelated);
        let mut state = IntervalState::new();

        for _ in 0..20 {
            let delay = state.next_delay(&policy);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_policy_deserializes_partial_json() {
        let policy: PollPolicy =
            serde_json::from_str(r#"{"interval_ms": 250, "backoff": "exponential"}"#).unwrap();
        assert_eq!(policy.interval_ms, 250);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.timeout_ms, 600_000);
    }
}
