//! Per-provider health tracking.
//!
//! A provider moves `Available -> Degraded` on its first failure and
//! `Degraded -> Unavailable` once consecutive failures reach the
//! threshold. Only a successful probe brings an unavailable provider back.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

/// Derived state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Available,
    Degraded,
    Unavailable,
}

/// Health record for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub available: bool,
    pub consecutive_failures: u32,
    pub last_failure_reason: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    fn new(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            available: true,
            consecutive_failures: 0,
            last_failure_reason: None,
            last_checked: None,
        }
    }

    pub fn state(&self) -> ProviderState {
        if !self.available {
            ProviderState::Unavailable
        } else if self.consecutive_failures > 0 {
            ProviderState::Degraded
        } else {
            ProviderState::Available
        }
    }
}

/// Shared health state for every provider a batch uses.
///
/// Unknown ids are reported as `Available` until something is recorded.
#[derive(Debug)]
pub struct HealthRegistry {
    records: RwLock<BTreeMap<String, ProviderHealth>>,
    failure_threshold: u32,
}

impl HealthRegistry {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn state(&self, provider_id: &str) -> ProviderState {
        self.records
            .read()
            .get(provider_id)
            .map(ProviderHealth::state)
            .unwrap_or(ProviderState::Available)
    }

    pub fn is_available(&self, provider_id: &str) -> bool {
        self.state(provider_id) != ProviderState::Unavailable
    }

    /// Snapshot of one provider's record.
    pub fn get(&self, provider_id: &str) -> ProviderHealth {
        self.records
            .read()
            .get(provider_id)
            .cloned()
            .unwrap_or_else(|| ProviderHealth::new(provider_id))
    }

    /// Snapshot of every record.
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        self.records.read().values().cloned().collect()
    }

    /// A completion succeeded.
    pub fn record_success(&self, provider_id: &str) {
        let mut records = self.records.write();
        let health = records
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));
        if health.consecutive_failures > 0 {
            tracing::debug!(provider = provider_id, "Failure streak reset by success");
        }
        health.consecutive_failures = 0;
        health.available = true;
        health.last_checked = Some(Utc::now());
    }

    /// An invocation failed after exhausting its attempts.
    pub fn record_failure(&self, provider_id: &str, reason: &str) {
        let mut records = self.records.write();
        let health = records
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));
        health.consecutive_failures += 1;
        health.last_failure_reason = Some(reason.to_string());
        health.last_checked = Some(Utc::now());

        if health.available && health.consecutive_failures >= self.failure_threshold {
            health.available = false;
            tracing::warn!(
                provider = provider_id,
                failures = health.consecutive_failures,
                "Provider marked unavailable after repeated failures"
            );
        } else if health.consecutive_failures == 1 {
            tracing::warn!(provider = provider_id, "Provider degraded");
        }
    }

    /// Apply a probe result.
    pub fn record_probe(&self, provider_id: &str, ok: bool) {
        let mut records = self.records.write();
        let health = records
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(provider_id));
        health.last_checked = Some(Utc::now());

        if ok {
            if !health.available {
                tracing::info!(provider = provider_id, "Provider recovered");
            }
            health.available = true;
            health.consecutive_failures = 0;
        } else {
            if health.available {
                tracing::warn!(provider = provider_id, "Provider probe failed");
            }
            health.available = false;
            health.last_failure_reason = Some("probe failed".to_string());
        }
    }

    /// Manually restore a provider.
    pub fn mark_recovered(&self, provider_id: &str) {
        self.record_probe(provider_id, true);
    }

    pub fn reset(&self) {
        self.records.write().clear();
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_starts_available() {
        let health = HealthRegistry::default();
        assert_eq!(health.state("a"), ProviderState::Available);
        assert!(health.snapshot().is_empty());
    }

    #[test]
    fn test_failures_degrade_then_disable() {
        let health = HealthRegistry::new(3);

        health.record_failure("a", "connection reset");
        assert_eq!(health.state("a"), ProviderState::Degraded);
        health.record_failure("a", "connection reset");
        assert_eq!(health.state("a"), ProviderState::Degraded);
        health.record_failure("a", "connection reset");
        assert_eq!(health.state("a"), ProviderState::Unavailable);
        assert!(!health.is_available("a"));
        assert_eq!(
            health.get("a").last_failure_reason.as_deref(),
            Some("connection reset")
        );
    }

    #[test]
    fn test_success_resets_streak() {
        let health = HealthRegistry::new(3);
        health.record_failure("a", "connection reset");
        health.record_failure("a", "connection reset");
        health.record_success("a");
        assert_eq!(health.state("a"), ProviderState::Available);

        health.record_failure("a", "connection reset");
        health.record_failure("a", "connection reset");
        assert_eq!(health.state("a"), ProviderState::Degraded);
    }

    #[test]
    fn test_only_probe_recovers() {
        let health = HealthRegistry::new(1);
        health.record_failure("a", "connection reset");
        assert_eq!(health.state("a"), ProviderState::Unavailable);

        health.record_probe("a", false);
        assert_eq!(health.state("a"), ProviderState::Unavailable);
        assert!(health.get("a").last_checked.is_some());

        health.record_probe("a", true);
        assert_eq!(health.state("a"), ProviderState::Available);
        assert_eq!(health.get("a").consecutive_failures, 0);
    }

    #[test]
    fn test_providers_are_independent() {
        let health = HealthRegistry::new(1);
        health.record_failure("a", "connection reset");
        assert!(!health.is_available("a"));
        assert!(health.is_available("b"));

        health.reset();
        assert!(health.is_available("a"));
    }

    #[test]
    fn test_invocation_outcomes_stamp_last_checked() {
        let health = HealthRegistry::new(3);
        health.record_failure("a", "connection reset");
        let after_failure = health.get("a").last_checked.unwrap();

        health.record_success("b");
        assert!(health.get("b").last_checked.is_some());

        health.record_success("a");
        assert!(health.get("a").last_checked.unwrap() >= after_failure);
    }

    #[test]
    fn test_mark_recovered() {
        let health = HealthRegistry::new(1);
        health.record_probe("a", false);
        health.mark_recovered("a");
        assert_eq!(health.state("a"), ProviderState::Available);
    }
}
