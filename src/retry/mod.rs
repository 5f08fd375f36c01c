//! Reconnect delay policies for the hub client.
//!
//! Two policies are provided:
//! - [`ScheduledRetryPolicy`]: an explicit attempt → nominal-wait table whose
//!   last entry repeats forever. This is what the client uses by default.
//! - [`ExponentialRetryPolicy`]: `clamp(base * 2^n, max) * jitter`.
//!
//! Both apply an independent jitter factor drawn from `[0.75, 1.25]` per call
//! and never give up: there is no maximum attempt count.

use std::time::Duration;

use rand::Rng;

/// Lower bound of the jitter multiplier
pub const JITTER_MIN: f64 = 0.75;
/// Upper bound of the jitter multiplier
pub const JITTER_MAX: f64 = 1.25;

/// Nominal reconnect schedule in seconds, indexed by previous retry count.
pub const DEFAULT_SCHEDULE_SECS: [u64; 10] = [0, 2, 5, 10, 15, 20, 30, 30, 30, 60];

/// Ceiling for the exponential policy
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Information about the reconnect attempt being scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Number of attempts already made since the connection dropped
    pub previous_retry_count: u32,
    /// Time spent reconnecting so far
    pub elapsed: Duration,
}

impl RetryContext {
    pub fn new(previous_retry_count: u32, elapsed: Duration) -> Self {
        Self {
            previous_retry_count,
            elapsed,
        }
    }
}

/// Computes the wait before the next reconnect attempt.
pub trait RetryPolicy: Send + Sync {
    fn next_delay(&self, context: &RetryContext) -> Duration;
}

/// Draw a jitter multiplier in `[JITTER_MIN, JITTER_MAX]`
fn jitter_factor() -> f64 {
    rand::rng().random_range(JITTER_MIN..=JITTER_MAX)
}

fn apply_jitter(nominal: Duration, jitter: bool) -> Duration {
    if !jitter || nominal.is_zero() {
        return nominal;
    }
    nominal.mul_f64(jitter_factor())
}

/// Table-driven policy; the final entry repeats for all later attempts.
#[derive(Debug, Clone)]
pub struct ScheduledRetryPolicy {
    schedule: Vec<Duration>,
    jitter: bool,
}

impl ScheduledRetryPolicy {
    /// Build a policy from an explicit schedule.
    ///
    /// An empty schedule behaves as a single zero entry.
    pub fn new(schedule: Vec<Duration>) -> Self {
        let schedule = if schedule.is_empty() {
            vec![Duration::ZERO]
        } else {
            schedule
        };
        Self {
            schedule,
            jitter: true,
        }
    }

    /// Disable jitter (nominal delays only)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Nominal (un-jittered) delay for an attempt
    pub fn nominal_delay(&self, previous_retry_count: u32) -> Duration {
        let index = (previous_retry_count as usize).min(self.schedule.len() - 1);
        self.schedule[index]
    }
}

impl Default for ScheduledRetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_SCHEDULE_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        )
    }
}

impl RetryPolicy for ScheduledRetryPolicy {
    fn next_delay(&self, context: &RetryContext) -> Duration {
        apply_jitter(self.nominal_delay(context.previous_retry_count), self.jitter)
    }
}

/// Doubling policy capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialRetryPolicy {
    base: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl ExponentialRetryPolicy {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn nominal_delay(&self, previous_retry_count: u32) -> Duration {
        // 2^31 seconds is far past any sane ceiling; avoid overflow beyond it
        let factor = 2u32.saturating_pow(previous_retry_count.min(31));
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn next_delay(&self, context: &RetryContext) -> Duration {
        apply_jitter(self.nominal_delay(context.previous_retry_count), self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_jitter(delay: Duration, nominal_secs: u64) -> bool {
        let nominal = nominal_secs as f64;
        let actual = delay.as_secs_f64();
        actual >= nominal * JITTER_MIN - 1e-9 && actual <= nominal * JITTER_MAX + 1e-9
    }

    #[test]
    fn test_schedule_attempts_within_jitter_band() {
        let policy = ScheduledRetryPolicy::default();
        for _ in 0..50 {
            for (attempt, nominal) in DEFAULT_SCHEDULE_SECS.iter().enumerate() {
                let delay = policy.next_delay(&RetryContext::new(attempt as u32, Duration::ZERO));
                assert!(
                    within_jitter(delay, *nominal),
                    "attempt {} produced {:?}",
                    attempt,
                    delay
                );
            }
        }
    }

    #[test]
    fn test_first_reconnect_is_immediate() {
        let policy = ScheduledRetryPolicy::default();
        let delay = policy.next_delay(&RetryContext::new(0, Duration::ZERO));
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_tail_settles_at_sixty_seconds() {
        let policy = ScheduledRetryPolicy::default();
        for attempt in [10, 11, 25, 1_000, u32::MAX] {
            let delay = policy.next_delay(&RetryContext::new(attempt, Duration::from_secs(3600)));
            assert!(within_jitter(delay, 60), "attempt {} produced {:?}", attempt, delay);
        }
    }

    #[test]
    fn test_seventh_attempt_waits_about_thirty_seconds() {
        let policy = ScheduledRetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.next_delay(&RetryContext::new(6, Duration::ZERO));
            assert!(delay >= Duration::from_millis(22_500));
            assert!(delay <= Duration::from_millis(37_500));
        }
    }

    #[test]
    fn test_without_jitter_returns_nominal() {
        let policy = ScheduledRetryPolicy::default().without_jitter();
        assert_eq!(
            policy.next_delay(&RetryContext::new(3, Duration::ZERO)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_empty_schedule_is_immediate() {
        let policy = ScheduledRetryPolicy::new(vec![]);
        assert_eq!(policy.nominal_delay(5), Duration::ZERO);
    }

    #[test]
    fn test_exponential_doubles_until_cap() {
        let policy = ExponentialRetryPolicy::default().without_jitter();
        assert_eq!(policy.nominal_delay(0), Duration::from_secs(1));
        assert_eq!(policy.nominal_delay(1), Duration::from_secs(2));
        assert_eq!(policy.nominal_delay(5), Duration::from_secs(32));
        assert_eq!(policy.nominal_delay(6), Duration::from_secs(60));
        assert_eq!(policy.nominal_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_jitter_band() {
        let policy = ExponentialRetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.next_delay(&RetryContext::new(3, Duration::ZERO));
            assert!(within_jitter(delay, 8));
        }
    }
}
