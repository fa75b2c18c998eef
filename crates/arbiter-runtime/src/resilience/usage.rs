//! Token usage and cost accounting per provider.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::providers::TokenUsage;

/// Accumulated usage for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Completions returned by the provider
    pub llm_calls: u32,
    /// Judgments served from the completion cache
    pub cache_hits: u32,
    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.estimated_cost += estimate_cost(usage, model);
    }
}

/// Estimated cost of one completion.
pub fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
    // USD per million tokens (input, output)
    let (input_rate, output_rate) = match model {
        "scripted" => (0.0, 0.0),
        m if m.contains("sonnet") => (3.0, 15.0),
        m if m.contains("opus") => (5.0, 25.0),
        m if m.contains("haiku") => (1.0, 5.0),
        m if m.contains("gpt-4o-mini") => (0.15, 0.6),
        m if m.contains("gpt-4o") => (2.5, 10.0),
        _ => (3.0, 15.0),
    };

    (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate
        + (usage.completion_tokens as f64 / 1_000_000.0) * output_rate
}

/// Usage tracker shared by all workers of a batch.
#[derive(Debug, Default)]
pub struct UsageTracker {
    per_provider: RwLock<BTreeMap<String, LlmUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider_id: &str, usage: &TokenUsage, model: &str) {
        self.per_provider
            .write()
            .entry(provider_id.to_string())
            .or_default()
            .add(usage, model);
    }

    pub fn record_cache_hit(&self, provider_id: &str) {
        self.per_provider
            .write()
            .entry(provider_id.to_string())
            .or_default()
            .cache_hits += 1;
    }

    pub fn for_provider(&self, provider_id: &str) -> LlmUsage {
        self.per_provider
            .read()
            .get(provider_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, LlmUsage> {
        self.per_provider.read().clone()
    }

    /// Sum over every provider.
    pub fn total(&self) -> LlmUsage {
        self.per_provider
            .read()
            .values()
            .fold(LlmUsage::default(), |mut acc, u| {
                acc.prompt_tokens += u.prompt_tokens;
                acc.completion_tokens += u.completion_tokens;
                acc.total_tokens += u.total_tokens;
                acc.llm_calls += u.llm_calls;
                acc.cache_hits += u.cache_hits;
                acc.estimated_cost += u.estimated_cost;
                acc
            })
    }
}
