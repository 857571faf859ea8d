//! Revival policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::duration_millis;

/// Default ceiling on attempts per logical job
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Configuration for job revival
///
/// Bounds how often a failing job is resubmitted and how long the scheduler
/// waits before each resubmission. Supports exponential backoff with jitter.
///
/// # Example
///
/// ```
/// use revive_engine::RevivalPolicy;
/// use std::time::Duration;
///
/// let policy = RevivalPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_millis(100))
///     .with_max_interval(Duration::from_secs(5));
///
/// // First revival after ~100ms
/// // Second revival after ~200ms
/// // Third revival after ~400ms
/// // etc.
/// # assert!(policy.has_attempts_remaining(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevivalPolicy {
    /// Maximum number of attempts (including the first); `None` revives forever
    pub max_attempts: Option<u32>,

    /// Delay before the first revival
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between revivals
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0) to add randomness
    ///
    /// A value of 0.1 means ±10% randomness.
    pub jitter: f64,
}

impl Default for RevivalPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl RevivalPolicy {
    /// Revive right away, up to [`DEFAULT_MAX_ATTEMPTS`] attempts
    pub fn immediate() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Revive right away, with no ceiling
    ///
    /// A job whose units keep failing is revived forever under this policy.
    pub fn unlimited() -> Self {
        Self {
            max_attempts: None,
            ..Self::immediate()
        }
    }

    /// Exponential backoff with sensible defaults
    ///
    /// - 10 max attempts
    /// - 1 second initial interval
    /// - 60 second max interval
    /// - 2x backoff coefficient
    /// - 10% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: Some(10),
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    /// Fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Never revive
    pub fn no_revival() -> Self {
        Self::immediate().with_max_attempts(1)
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Remove the attempt ceiling
    pub fn without_limit(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Set the delay before the first revival
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum revival interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff coefficient
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before starting the given attempt (1-based)
    ///
    /// The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.initial_interval.is_zero() {
            return Duration::ZERO;
        }

        let revival_num = attempt - 1; // First revival happens before attempt 2
        let base = self.initial_interval.as_secs_f64()
            * self.backoff_coefficient.powi(revival_num as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 && capped > 0.0 {
            let jitter_range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Whether another attempt may follow `current_attempt`
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => current_attempt < max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_immediate_with_ceiling() {
        let policy = RevivalPolicy::default();
        assert_eq!(policy.max_attempts, Some(DEFAULT_MAX_ATTEMPTS));
        assert_eq!(policy.delay_for_attempt(2), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(40), Duration::ZERO);
    }

    #[test]
    fn test_unlimited() {
        let policy = RevivalPolicy::unlimited();
        assert!(policy.max_attempts.is_none());
        assert!(policy.has_attempts_remaining(u32::MAX - 1));
    }

    #[test]
    fn test_no_revival() {
        let policy = RevivalPolicy::no_revival();
        assert_eq!(policy.max_attempts, Some(1));
        assert!(!policy.has_attempts_remaining(1));
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RevivalPolicy::fixed(Duration::from_secs(5), 3);

        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = RevivalPolicy::exponential().with_jitter(0.0); // Disable jitter for predictable tests

        // Attempt 1 (initial) has no delay
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);

        // Attempt 2 (first revival) = 1 second
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));

        // Attempt 3 (second revival) = 2 seconds
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));

        // Attempt 4 (third revival) = 4 seconds
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RevivalPolicy::exponential().with_jitter(0.5);

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_max_interval_cap() {
        let policy = RevivalPolicy::exponential()
            .with_max_interval(Duration::from_secs(5))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_has_attempts_remaining() {
        let policy = RevivalPolicy::immediate().with_max_attempts(3);

        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn test_builder_clamps() {
        let policy = RevivalPolicy::immediate()
            .with_max_attempts(0)
            .with_backoff_coefficient(0.5)
            .with_jitter(3.0);

        assert_eq!(policy.max_attempts, Some(1));
        assert_eq!(policy.backoff_coefficient, 1.0);
        assert_eq!(policy.jitter, 1.0);
        assert!(policy.without_limit().max_attempts.is_none());
    }

    #[test]
    fn test_serialization() {
        let policy = RevivalPolicy::exponential().with_max_attempts(7);

        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RevivalPolicy = serde_json::from_str(&json).unwrap();

        assert_eq!(policy, parsed);
    }
}
