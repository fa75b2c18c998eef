//! Scripted provider: replays programmed replies instead of calling an LLM.
//!
//! Used for tests and CLI dry runs. Replies are chosen by the first rule
//! whose needle appears in the prompt; each rule serves its replies in
//! order and repeats the last one once exhausted.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::Rubric;

use super::{
    factory::ProviderFactory, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    TokenUsage,
};

/// One programmed reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text as the completion
    Text(String),
    /// Fail with this error
    Fail(ProviderError),
}

impl ScriptedReply {
    /// A well-formed judgment scoring the rubric's criteria in order.
    pub fn scores(rubric: &Rubric, values: [f64; 4], rationale: &str) -> Self {
        let scores: BTreeMap<&str, f64> = rubric.names().zip(values).collect();
        Self::Text(
            serde_json::json!({
                "scores": scores,
                "rationale": rationale,
            })
            .to_string(),
        )
    }

    /// A judgment giving every criterion the same score.
    pub fn uniform(score: f64, rationale: &str) -> Self {
        Self::scores(&Rubric::default(), [score; 4], rationale)
    }
}

struct Rule {
    needle: String,
    replies: Vec<ScriptedReply>,
    served: usize,
}

impl Rule {
    fn next_reply(&mut self) -> Option<ScriptedReply> {
        let reply = self
            .replies
            .get(self.served)
            .or_else(|| self.replies.last())
            .cloned();
        self.served += 1;
        reply
    }
}

/// Provider that answers from a script.
pub struct ScriptedProvider {
    name: String,
    rules: Mutex<Vec<Rule>>,
    default_reply: ScriptedReply,
    probe_ok: AtomicBool,
    latency: Duration,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Provider that scores every plan 7.0 on every criterion.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Mutex::new(Vec::new()),
            default_reply: ScriptedReply::uniform(7.0, "Scripted judgment."),
            probe_ok: AtomicBool::new(true),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply used when no rule matches.
    pub fn always(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Serve `replies` in order for prompts containing `needle`.
    pub fn when_prompt_contains(
        self,
        needle: impl Into<String>,
        replies: Vec<ScriptedReply>,
    ) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.into(),
            replies,
            served: 0,
        });
        self
    }

    /// Result of `probe()`.
    pub fn with_probe(self, ok: bool) -> Self {
        self.set_probe(ok);
        self
    }

    /// Simulated network latency per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Change the probe result on a shared instance.
    pub fn set_probe(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    /// Number of `invoke` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `invoke` calls whose prompt contained `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }

    fn pick_reply(&self, prompt: &str) -> ScriptedReply {
        let mut rules = self.rules.lock();
        rules
            .iter_mut()
            .find(|rule| prompt.contains(&rule.needle))
            .and_then(Rule::next_reply)
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn invoke(
        &self,
        prompt: &str,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.pick_reply(prompt) {
            ScriptedReply::Text(content) => Ok(CompletionResponse {
                usage: TokenUsage {
                    prompt_tokens: self.estimate_tokens(prompt),
                    completion_tokens: self.estimate_tokens(&content),
                },
                content,
                model: "scripted".to_string(),
            }),
            ScriptedReply::Fail(err) => Err(err),
        }
    }

    async fn probe(&self) -> bool {
        self.probe_ok.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for scripted providers.
///
/// ## Settings
/// ```json
/// {
///   "name": "dry-run",                              // Optional
///   "scores": {"risk_coverage": 8, "feasibility": 7,
///              "compliance_alignment": 6, "clarity": 9},  // Optional, default 7 each
///   "rationale": "Scripted judgment.",              // Optional
///   "probe": true                                   // Optional
/// }
/// ```
pub struct ScriptedProviderFactory;

impl ProviderFactory for ScriptedProviderFactory {
    fn provider_type(&self) -> &'static str {
        "scripted"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;

        let name = config["name"].as_str().unwrap_or("scripted");
        let rationale = config["rationale"].as_str().unwrap_or("Scripted judgment.");
        let mut provider = ScriptedProvider::new(name);

        if let Some(scores) = config["scores"].as_object() {
            let reply = serde_json::json!({
                "scores": scores,
                "rationale": rationale,
            });
            provider = provider.always(ScriptedReply::Text(reply.to_string()));
        }

        if let Some(ok) = config["probe"].as_bool() {
            provider = provider.with_probe(ok);
        }

        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if let Some(scores) = config.get("scores") {
            let valid = scores
                .as_object()
                .map(|map| map.values().all(JsonValue::is_number))
                .unwrap_or(false);
            if !valid {
                return Err(ProviderError::NotConfigured(
                    "scripted 'scores' must be an object of numbers".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Scripted provider replaying fixed judgments (tests and dry runs)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_serve_in_order_then_repeat() {
        let provider = ScriptedProvider::new("s").when_prompt_contains(
            "plan-2",
            vec![
                ScriptedReply::Fail(ProviderError::Connection("reset".into())),
                ScriptedReply::Text("second".into()),
            ],
        );
        let config = CompletionConfig::default();

        assert!(provider.invoke("plan-2", &config).await.is_err());
        assert_eq!(provider.invoke("plan-2", &config).await.unwrap().content, "second");
        assert_eq!(provider.invoke("plan-2", &config).await.unwrap().content, "second");
        assert!(provider.invoke("plan-1", &config).await.unwrap().content.contains("scores"));

        assert_eq!(provider.calls(), 4);
        assert_eq!(provider.calls_matching("plan-2"), 3);
    }

    #[tokio::test]
    async fn test_probe_toggle() {
        let provider = ScriptedProvider::new("s").with_probe(false);
        assert!(!provider.probe().await);
        provider.set_probe(true);
        assert!(provider.probe().await);
    }

    #[test]
    fn test_factory_rejects_non_numeric_scores() {
        let factory = ScriptedProviderFactory;
        let config = serde_json::json!({"scores": {"clarity": "high"}});
        assert!(factory.validate_config(&config).is_err());
        assert!(factory.create(&config).is_err());
    }

    #[tokio::test]
    async fn test_factory_uses_configured_scores() {
        let factory = ScriptedProviderFactory;
        let provider = factory
            .create(&serde_json::json!({
                "name": "fixed",
                "scores": {"risk_coverage": 9, "feasibility": 8, "compliance_alignment": 7, "clarity": 6},
                "probe": false
            }))
            .unwrap();

        assert_eq!(provider.name(), "fixed");
        assert!(!provider.probe().await);
        let reply = provider.invoke("anything", &CompletionConfig::default()).await.unwrap();
        assert!(reply.content.contains("\"risk_coverage\":9"));
    }
}
