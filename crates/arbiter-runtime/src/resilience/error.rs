//! Failure taxonomy for provider calls.

use serde::Serialize;
use thiserror::Error;

use super::retry::EvaluationAttempt;
use crate::providers::ProviderError;

/// Kind of failure, after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network failure, 5xx, or a malformed response envelope
    Connection,
    /// Attempt exceeded the configured timeout
    Timeout,
    /// Provider asked us to slow down
    RateLimit,
    /// Credentials rejected
    Authentication,
    /// Account quota or billing exhausted
    QuotaExceeded,
    /// Request rejected for any other reason (4xx, missing configuration)
    Rejected,
    /// Provider unknown or marked unavailable; no call was made
    Unavailable,
}

impl FailureKind {
    /// Whether another attempt may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Connection | FailureKind::Timeout | FailureKind::RateLimit
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Connection => "connection",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::Authentication => "authentication",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::Rejected => "rejected",
            FailureKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

const QUOTA_MARKERS: [&str; 4] = ["insufficient_quota", "quota", "credit balance", "billing"];

fn mentions_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a raw provider error.
pub fn classify(error: &ProviderError) -> FailureKind {
    match error {
        ProviderError::Connection(_) | ProviderError::Parse(_) => FailureKind::Connection,
        ProviderError::Timeout(_) => FailureKind::Timeout,
        ProviderError::RateLimited { .. } => FailureKind::RateLimit,
        ProviderError::Auth(_) => FailureKind::Authentication,
        ProviderError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
        ProviderError::NotConfigured(_) => FailureKind::Rejected,
        ProviderError::Api { status, message } => match *status {
            401 | 403 => FailureKind::Authentication,
            402 => FailureKind::QuotaExceeded,
            429 if mentions_quota(message) => FailureKind::QuotaExceeded,
            429 => FailureKind::RateLimit,
            408 => FailureKind::Connection,
            s if s >= 500 => FailureKind::Connection,
            _ if mentions_quota(message) => FailureKind::QuotaExceeded,
            _ => FailureKind::Rejected,
        },
    }
}

/// A provider call that did not produce a completion.
#[derive(Debug, Clone, Error)]
#[error("{provider_id}: {kind} failure after {} attempt(s): {message}", .attempts.len())]
pub struct ClassifiedError {
    pub provider_id: String,
    pub kind: FailureKind,
    pub message: String,
    /// Every attempt made, in order. Empty when the call was refused.
    pub attempts: Vec<EvaluationAttempt>,
}

impl ClassifiedError {
    /// Refusal without calling the provider.
    pub fn unavailable(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            kind: FailureKind::Unavailable,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api(status: u16, message: &str) -> ProviderError {
        ProviderError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert_eq!(classify(&ProviderError::Connection("reset".into())), FailureKind::Connection);
        assert_eq!(classify(&ProviderError::Timeout(Duration::from_secs(1))), FailureKind::Timeout);
        assert_eq!(
            classify(&ProviderError::RateLimited { retry_after: None }),
            FailureKind::RateLimit
        );
        assert_eq!(classify(&api(503, "overloaded")), FailureKind::Connection);
        assert_eq!(classify(&api(408, "request timeout")), FailureKind::Connection);
        assert_eq!(classify(&ProviderError::Parse("eof".into())), FailureKind::Connection);
        assert!(classify(&api(502, "")).is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert_eq!(classify(&api(401, "bad key")), FailureKind::Authentication);
        assert_eq!(classify(&api(403, "forbidden")), FailureKind::Authentication);
        assert_eq!(classify(&api(402, "payment required")), FailureKind::QuotaExceeded);
        assert_eq!(classify(&api(400, "context too long")), FailureKind::Rejected);
        assert_eq!(
            classify(&ProviderError::NotConfigured("no key".into())),
            FailureKind::Rejected
        );
        assert!(!FailureKind::Authentication.is_retryable());
        assert!(!FailureKind::QuotaExceeded.is_retryable());
        assert!(!FailureKind::Unavailable.is_retryable());
    }

    #[test]
    fn test_quota_wording_beats_rate_limit_status() {
        assert_eq!(classify(&api(429, "insufficient_quota")), FailureKind::QuotaExceeded);
        assert_eq!(classify(&api(429, "slow down")), FailureKind::RateLimit);
        assert_eq!(
            classify(&api(400, "Your credit balance is too low")),
            FailureKind::QuotaExceeded
        );
    }

    #[test]
    fn test_unavailable_has_no_attempts() {
        let err = ClassifiedError::unavailable("b", "provider marked unavailable");
        assert_eq!(err.kind, FailureKind::Unavailable);
        assert_eq!(err.attempt_count(), 0);
        assert!(err.to_string().contains("unavailable"));
    }
}
