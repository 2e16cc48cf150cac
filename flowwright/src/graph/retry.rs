//! Retry policies for node execution.
//!
//! Applied by the run loop to transient node failures. Interrupts,
//! write conflicts, budget violations, and cancellation are never retried.

use std::time::Duration;

/// Retry policy for node failures.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// No retry — fail immediately on error.
    #[default]
    None,
    /// Retry with a constant delay between attempts.
    Fixed {
        max_attempts: usize,
        interval: Duration,
    },
    /// Retry with exponentially increasing delays, capped at `max_interval`.
    Exponential {
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy::None
    }

    pub fn fixed(max_attempts: usize, interval: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts,
            interval,
        }
    }

    pub fn exponential(
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    ) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            initial_interval,
            max_interval,
            multiplier,
        }
    }

    /// Whether another attempt should be made after `attempt` failures.
    pub fn should_retry(&self, attempt: usize) -> bool {
        match self {
            RetryPolicy::None => false,
            RetryPolicy::Fixed { max_attempts, .. }
            | RetryPolicy::Exponential { max_attempts, .. } => attempt < *max_attempts,
        }
    }

    /// Delay before the given attempt.
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { interval, .. } => *interval,
            RetryPolicy::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                ..
            } => {
                let secs = initial_interval.as_secs_f64() * multiplier.powi(attempt as i32);
                Duration::from_secs_f64(secs).min(*max_interval)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: None never retries; Fixed retries up to max_attempts with constant delay.
    #[test]
    fn none_and_fixed_policies() {
        assert!(!RetryPolicy::none().should_retry(0));
        let fixed = RetryPolicy::fixed(2, Duration::from_millis(10));
        assert!(fixed.should_retry(0));
        assert!(fixed.should_retry(1));
        assert!(!fixed.should_retry(2));
        assert_eq!(fixed.delay(1), Duration::from_millis(10));
    }

    /// **Scenario**: Exponential delays double and respect the cap.
    #[test]
    fn exponential_delays_and_cap() {
        let policy = RetryPolicy::exponential(
            4,
            Duration::from_secs(1),
            Duration::from_secs(3),
            2.0,
        );
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(3)); // capped
    }
}
