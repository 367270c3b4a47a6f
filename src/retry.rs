//! Retry strategies for transient failures.
//!
//! A strategy only decides *how long* to wait and *how many* retries are
//! allowed. Whether a failure is transient at all is fixed by
//! [`Error::is_retryable`](crate::Error::is_retryable).

use crate::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// Defines how failed requests are retried.
///
/// Total attempts for a request are always `max_retries + 1`.
///
/// # Examples
///
/// ```
/// use bubble_api::RetryStrategy;
/// use std::time::Duration;
///
/// // 200ms, 200ms, 200ms
/// let constant = RetryStrategy::Constant {
///     delay: Duration::from_millis(200),
///     max_retries: 3,
/// };
///
/// // 100ms, 200ms, 400ms, 800ms
/// let exponential = RetryStrategy::Exponential {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     max_retries: 4,
///     jitter: false,
/// };
///
/// // 0s, 2s, 4s, 8s
/// let power = RetryStrategy::Power {
///     base: Duration::from_secs(2),
///     max_retries: 4,
/// };
/// # let _ = (constant, exponential, power);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// A single attempt, no retries.
    None,

    /// The same delay before every retry.
    Constant {
        /// Delay before each retry.
        delay: Duration,
        /// Maximum number of retries.
        max_retries: usize,
    },

    /// Delay doubles on each retry: `initial_delay * 2^(attempt - 1)`, capped at `max_delay`.
    Exponential {
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Upper bound for a single delay.
        max_delay: Duration,
        /// Maximum number of retries.
        max_retries: usize,
        /// Adds a random extra of up to 50% on top of each delay.
        jitter: bool,
    },

    /// First retry is immediate, retry `n >= 2` waits `base^(n - 1)` seconds.
    ///
    /// `base` must be strictly greater than one second.
    Power {
        /// Base of the power series, in seconds.
        base: Duration,
        /// Maximum number of retries.
        max_retries: usize,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Constant {
            delay: Duration::from_millis(200),
            max_retries: 3,
        }
    }
}

impl RetryStrategy {
    /// Builds the simple constant or doubling policy from a retry count and base sleep.
    pub fn with_backoff(max_retries: usize, sleep: Duration, exponential: bool) -> Self {
        if exponential {
            RetryStrategy::Exponential {
                initial_delay: sleep,
                max_delay: Duration::MAX,
                max_retries,
                jitter: false,
            }
        } else {
            RetryStrategy::Constant {
                delay: sleep,
                max_retries,
            }
        }
    }

    /// Returns the delay before the given retry, or `None` if retries are exhausted.
    ///
    /// `attempt` is 1-indexed: `1` is the first retry.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries() {
            return None;
        }

        match self {
            RetryStrategy::None => None,
            RetryStrategy::Constant { delay, .. } => Some(*delay),
            RetryStrategy::Exponential {
                initial_delay,
                max_delay,
                jitter,
                ..
            } => {
                let multiplier = 2u32.saturating_pow((attempt - 1) as u32);
                let delay = initial_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let extra = rand::thread_rng().gen_range(0.0..=0.5);
                    Some(delay.saturating_add(delay.mul_f64(extra)))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Power { base, .. } => {
                if attempt == 1 {
                    return Some(Duration::ZERO);
                }
                let secs = base.as_secs_f64().powi((attempt - 1) as i32);
                Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
            }
        }
    }

    /// Returns the maximum number of retries.
    pub fn max_retries(&self) -> usize {
        match self {
            RetryStrategy::None => 0,
            RetryStrategy::Constant { max_retries, .. }
            | RetryStrategy::Exponential { max_retries, .. }
            | RetryStrategy::Power { max_retries, .. } => *max_retries,
        }
    }

    /// Checks that the strategy can be used.
    ///
    /// # Errors
    ///
    /// A `Power` strategy with a base of one second or less never grows and is rejected.
    pub fn validate(&self) -> Result<()> {
        match self {
            RetryStrategy::Power { base, .. } if *base <= Duration::from_secs(1) => {
                Err(Error::ConfigurationError(format!(
                    "power backoff base must be greater than 1s, got {:?}",
                    base
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_delays() {
        let strategy = RetryStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 5,
            jitter: false,
        };

        assert_eq!(
            strategy.delay_for_attempt(1),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            strategy.delay_for_attempt(2),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            strategy.delay_for_attempt(3),
            Some(Duration::from_millis(400))
        );
        assert_eq!(
            strategy.delay_for_attempt(5),
            Some(Duration::from_millis(1600))
        );
        assert_eq!(strategy.delay_for_attempt(6), None);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let strategy = RetryStrategy::Exponential {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            max_retries: 4,
            jitter: false,
        };
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_jitter_never_shortens_delay() {
        let strategy = RetryStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 3,
            jitter: true,
        };
        for _ in 0..50 {
            let delay = strategy.delay_for_attempt(2).unwrap();
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_constant_delays() {
        let strategy = RetryStrategy::Constant {
            delay: Duration::from_secs(1),
            max_retries: 3,
        };

        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_secs(1)));
        assert_eq!(strategy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_power_first_retry_is_immediate() {
        let strategy = RetryStrategy::Power {
            base: Duration::from_secs(3),
            max_retries: 4,
        };

        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::ZERO));
        assert_eq!(strategy.delay_for_attempt(2), Some(Duration::from_secs(3)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_secs(9)));
        assert_eq!(strategy.delay_for_attempt(4), Some(Duration::from_secs(27)));
        assert_eq!(strategy.delay_for_attempt(5), None);
    }

    #[test]
    fn test_power_base_must_exceed_one_second() {
        let strategy = RetryStrategy::Power {
            base: Duration::from_secs(1),
            max_retries: 2,
        };
        assert!(matches!(
            strategy.validate(),
            Err(Error::ConfigurationError(_))
        ));
        assert!(RetryStrategy::default().validate().is_ok());
    }

    #[test]
    fn test_zero_retries() {
        assert_eq!(RetryStrategy::None.delay_for_attempt(1), None);
        let strategy = RetryStrategy::with_backoff(0, Duration::from_millis(10), true);
        assert_eq!(strategy.max_retries(), 0);
        assert_eq!(strategy.delay_for_attempt(1), None);
    }
}
