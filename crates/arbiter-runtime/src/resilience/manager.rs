//! Resilient provider invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;

use super::error::{classify, ClassifiedError};
use super::health::HealthRegistry;
use super::retry::{prompt_digest, AttemptOutcome, EvaluationAttempt, RetryPolicy};
use super::usage::UsageTracker;
use crate::cache::JudgmentCache;
use crate::config::RuntimeConfig;
use crate::providers::{CompletionConfig, LlmProvider, ProviderError, TokenUsage};

/// A successful provider call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub provider_id: String,
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    /// Every attempt made, the last one successful
    pub attempts: Vec<EvaluationAttempt>,
}

/// Owns the providers and runs every call through retry, timeout and
/// health tracking.
pub struct ResilienceManager {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    policy: RetryPolicy,
    completion: CompletionConfig,
    health: Arc<HealthRegistry>,
    usage: Arc<UsageTracker>,
    judgments: Option<JudgmentCache>,
}

impl ResilienceManager {
    pub fn new(providers: BTreeMap<String, Arc<dyn LlmProvider>>, config: &RuntimeConfig) -> Self {
        Self {
            providers,
            policy: RetryPolicy::from_config(config),
            completion: config.completion.clone(),
            health: Arc::new(HealthRegistry::new(config.failure_threshold)),
            usage: Arc::new(UsageTracker::new()),
            judgments: JudgmentCache::from_config(&config.cache),
        }
    }

    /// Share a health registry with other managers.
    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = health;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn judgments(&self) -> Option<&JudgmentCache> {
        self.judgments.as_ref()
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Probe every provider concurrently and record the results.
    pub async fn check_availability(&self) -> BTreeMap<String, bool> {
        let probes = self.providers.iter().map(|(id, provider)| async move {
            let ok = self.bounded_probe(provider.as_ref()).await;
            (id.clone(), ok)
        });

        let results: BTreeMap<String, bool> = join_all(probes).await.into_iter().collect();
        for (id, ok) in &results {
            self.health.record_probe(id, *ok);
        }

        tracing::debug!(?results, "Provider availability checked");
        results
    }

    /// A probe that outlives the attempt timeout counts as a failure.
    async fn bounded_probe(&self, provider: &dyn LlmProvider) -> bool {
        match tokio::time::timeout(self.policy.attempt_timeout, provider.probe()).await {
            Ok(ok) => ok,
            Err(_) => {
                tracing::warn!(provider = provider.name(), "Probe timed out");
                false
            }
        }
    }

    /// Invoke a provider, retrying transient failures.
    ///
    /// Makes at most `max_attempts` calls. The health registry is updated
    /// once per invocation, not per attempt.
    pub async fn invoke_with_retry(
        &self,
        provider_id: &str,
        prompt: &str,
    ) -> Result<Completion, ClassifiedError> {
        let provider = match self.providers.get(provider_id) {
            Some(provider) => Arc::clone(provider),
            None => {
                return Err(ClassifiedError::unavailable(
                    provider_id,
                    "no provider registered under this id",
                ))
            }
        };

        if !self.health.is_available(provider_id) {
            let ok = self.bounded_probe(provider.as_ref()).await;
            self.health.record_probe(provider_id, ok);
            if !ok {
                tracing::debug!(provider = provider_id, "Refusing call: recovery probe failed");
                return Err(ClassifiedError::unavailable(
                    provider_id,
                    "provider marked unavailable and recovery probe failed",
                ));
            }
        }

        let digest = prompt_digest(prompt);
        let mut delays = self.policy.delays();
        let mut attempts = Vec::new();
        let mut attempt_number: u32 = 0;

        loop {
            attempt_number += 1;
            let started = Instant::now();
            let result = tokio::time::timeout(
                self.policy.attempt_timeout,
                provider.invoke(prompt, &self.completion),
            )
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.policy.attempt_timeout)));
            let latency = started.elapsed();

            let error = match result {
                Ok(response) => {
                    attempts.push(EvaluationAttempt {
                        provider_id: provider_id.to_string(),
                        prompt_digest: digest.clone(),
                        outcome: AttemptOutcome::Success,
                        attempt_number,
                        latency,
                    });
                    self.health.record_success(provider_id);
                    self.usage.record(provider_id, &response.usage, &response.model);

                    return Ok(Completion {
                        provider_id: provider_id.to_string(),
                        text: response.content,
                        usage: response.usage,
                        model: response.model,
                        attempts,
                    });
                }
                Err(error) => error,
            };

            let kind = classify(&error);
            let outcome = if kind.is_retryable() {
                AttemptOutcome::Retryable
            } else {
                AttemptOutcome::Fatal
            };
            attempts.push(EvaluationAttempt {
                provider_id: provider_id.to_string(),
                prompt_digest: digest.clone(),
                outcome,
                attempt_number,
                latency,
            });

            if kind.is_retryable() {
                if let Some(backoff) = delays.next() {
                    let delay = match &error {
                        ProviderError::RateLimited {
                            retry_after: Some(hint),
                        } => backoff.max(*hint),
                        _ => backoff,
                    };
                    tracing::debug!(
                        provider = provider_id,
                        attempt = attempt_number,
                        kind = %kind,
                        delay = ?delay,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            tracing::warn!(
                provider = provider_id,
                attempts = attempt_number,
                kind = %kind,
                error = %error,
                "Provider call failed"
            );
            self.health.record_failure(provider_id, &error.to_string());

            return Err(ClassifiedError {
                provider_id: provider_id.to_string(),
                kind,
                message: error.to_string(),
                attempts,
            });
        }
    }
}

impl std::fmt::Debug for ResilienceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceManager")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, ScriptedReply};
    use crate::resilience::{FailureKind, ProviderState};
    use std::time::Duration;

    fn manager_with(provider: Arc<ScriptedProvider>) -> ResilienceManager {
        let mut providers: BTreeMap<String, Arc<dyn LlmProvider>> = BTreeMap::new();
        providers.insert("a".to_string(), provider);
        ResilienceManager::new(providers, &RuntimeConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failures_use_every_attempt() {
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .always(ScriptedReply::Fail(ProviderError::Connection("reset".into()))),
        );
        let manager = manager_with(Arc::clone(&provider));

        let started = Instant::now();
        let err = manager.invoke_with_retry("a", "prompt").await.unwrap_err();

        assert_eq!(err.kind, FailureKind::Connection);
        assert_eq!(err.attempt_count(), 3);
        assert_eq!(provider.calls(), 3);
        // 2s + 4s of backoff
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(manager.health().get("a").consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let provider = Arc::new(
            ScriptedProvider::new("a")
                .always(ScriptedReply::Fail(ProviderError::Auth("bad".into()))),
        );
        let manager = manager_with(Arc::clone(&provider));

        let err = manager.invoke_with_retry("a", "prompt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Authentication);
        assert_eq!(provider.calls(), 1);
        assert_eq!(err.attempts[0].outcome, AttemptOutcome::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_attempt_budget() {
        let provider = Arc::new(ScriptedProvider::new("a").when_prompt_contains(
            "prompt",
            vec![
                ScriptedReply::Fail(ProviderError::RateLimited {
                    retry_after: Some(Duration::from_secs(10)),
                }),
                ScriptedReply::Text("ok".into()),
            ],
        ));
        let manager = manager_with(Arc::clone(&provider));

        let started = Instant::now();
        let completion = manager.invoke_with_retry("a", "prompt").await.unwrap();
        assert_eq!(completion.text, "ok");
        assert_eq!(completion.attempts.len(), 2);
        // retry-after hint beats the 2s backoff
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(manager.health().state("a"), ProviderState::Available);
        assert_eq!(manager.usage().for_provider("a").llm_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let provider = Arc::new(ScriptedProvider::new("a").with_latency(Duration::from_secs(120)));
        let manager = manager_with(provider).with_policy(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        });

        let err = manager.invoke_with_retry("a", "prompt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_refused() {
        let manager = manager_with(Arc::new(ScriptedProvider::new("a")));
        let err = manager.invoke_with_retry("missing", "prompt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Unavailable);
        assert_eq!(err.attempt_count(), 0);
    }

    /// Answers every call, but its probe never returns.
    struct HangingProbe(ScriptedProvider);

    #[async_trait::async_trait]
    impl LlmProvider for HangingProbe {
        async fn invoke(
            &self,
            prompt: &str,
            config: &CompletionConfig,
        ) -> Result<crate::providers::CompletionResponse, ProviderError> {
            self.0.invoke(prompt, config).await
        }

        async fn probe(&self) -> bool {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_counts_as_unavailable() {
        let mut providers: BTreeMap<String, Arc<dyn LlmProvider>> = BTreeMap::new();
        providers.insert("a".to_string(), Arc::new(HangingProbe(ScriptedProvider::new("a"))));
        let manager = ResilienceManager::new(providers, &RuntimeConfig::default());

        let started = Instant::now();
        let availability = manager.check_availability().await;
        assert_eq!(availability.get("a"), Some(&false));
        assert!(started.elapsed() >= manager.policy().attempt_timeout);

        let err = manager.invoke_with_retry("a", "prompt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Unavailable);
    }

    #[tokio::test]
    async fn test_unavailable_provider_needs_successful_probe() {
        let provider = Arc::new(ScriptedProvider::new("a").with_probe(false));
        let manager = manager_with(Arc::clone(&provider));

        let availability = manager.check_availability().await;
        assert_eq!(availability.get("a"), Some(&false));

        let err = manager.invoke_with_retry("a", "prompt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Unavailable);
        assert_eq!(provider.calls(), 0);

        provider.set_probe(true);
        assert!(manager.invoke_with_retry("a", "prompt").await.is_ok());
        assert_eq!(manager.health().state("a"), ProviderState::Available);
    }
}
