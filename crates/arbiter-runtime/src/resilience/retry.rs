//! Retry policy and per-attempt records.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use serde::Serialize;

use crate::config::RuntimeConfig;

/// How failed attempts are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential: bool,
    /// Bound on a single attempt
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.retry_delay,
            max_delay: config.max_retry_delay,
            exponential: config.exponential_backoff,
            attempt_timeout: config.timeout,
        }
    }

    /// Delays between attempts: one fewer than `max_attempts`.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let gaps = self.max_attempts.saturating_sub(1) as usize;
        if self.exponential {
            Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(self.base_delay)
                    .with_max_delay(self.max_delay)
                    .with_factor(2.0)
                    .with_max_times(gaps)
                    .build(),
            )
        } else {
            Box::new(
                ConstantBuilder::default()
                    .with_delay(self.base_delay)
                    .with_max_times(gaps)
                    .build(),
            )
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Retryable,
    Fatal,
}

/// One provider call made on behalf of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationAttempt {
    pub provider_id: String,
    pub prompt_digest: String,
    pub outcome: AttemptOutcome,
    /// 1-based
    pub attempt_number: u32,
    #[serde(with = "duration_text")]
    pub latency: Duration,
}

mod duration_text {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }
}

/// Stable short digest of a prompt, used for logs and cache keys.
pub fn prompt_digest(prompt: &str) -> String {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(max_attempts: u32, exponential: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            exponential,
            attempt_timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_exponential_delays_double() {
        let delays: Vec<_> = policy(4, true).delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_constant_delays() {
        let delays: Vec<_> = policy(3, false).delays().collect();
        assert_eq!(delays, vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        assert_eq!(policy(1, true).delays().count(), 0);
    }

    #[test]
    fn test_max_delay_caps_growth() {
        let mut p = policy(6, true);
        p.max_delay = Duration::from_secs(5);
        assert!(p.delays().all(|d| d <= Duration::from_secs(5)));
    }

    proptest! {
        #[test]
        fn prop_one_delay_between_each_attempt(
            max_attempts in 1u32..12,
            base_ms in 1u64..5_000,
            exponential in any::<bool>(),
        ) {
            let p = RetryPolicy {
                base_delay: Duration::from_millis(base_ms),
                ..policy(max_attempts, exponential)
            };
            let delays: Vec<_> = p.delays().collect();
            prop_assert_eq!(delays.len() as u32, max_attempts - 1);
            prop_assert!(delays.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(delays.iter().all(|d| *d <= p.max_delay.max(p.base_delay)));
        }
    }

    #[test]
    fn test_digest_is_stable_and_short() {
        assert_eq!(prompt_digest("plan-1"), prompt_digest("plan-1"));
        assert_ne!(prompt_digest("plan-1"), prompt_digest("plan-2"));
        assert_eq!(prompt_digest("x").len(), 16);
    }
}
