//! Cache of validated judgments.
//!
//! Resubmitting an identical plan to the same provider reuses the earlier
//! score set instead of spending another provider call. Only judgments that
//! parsed and validated are stored.

use moka::future::Cache;
use std::time::Duration;

use arbiter_core::ScoreSet;

use crate::config::CacheConfig;

/// Cache key: provider plus the digest of the rendered prompt.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JudgmentKey {
    pub provider_id: String,
    pub prompt_digest: String,
}

impl JudgmentKey {
    pub fn new(provider_id: impl Into<String>, prompt_digest: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            prompt_digest: prompt_digest.into(),
        }
    }
}

/// Judgment cache using moka.
pub struct JudgmentCache {
    cache: Cache<JudgmentKey, ScoreSet>,
}

impl JudgmentCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &JudgmentKey) -> Option<ScoreSet> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: JudgmentKey, judgment: ScoreSet) {
        self.cache.insert(key, judgment).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for JudgmentCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for JudgmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgmentCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::Rubric;
    use std::collections::BTreeMap;

    fn judgment(provider: &str) -> ScoreSet {
        let rubric = Rubric::default();
        let scores: BTreeMap<String, f64> =
            rubric.names().map(|n| (n.to_string(), 8.0)).collect();
        ScoreSet::new("plan-1", provider, scores, "Cached.", &rubric).unwrap()
    }

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = JudgmentCache::default();
        let key = JudgmentKey::new("primary", "abc");

        assert!(cache.get(&key).await.is_none());

        cache.insert(key.clone(), judgment("primary")).await;
        let cached = cache.get(&key).await.unwrap();
        assert!((cached.weighted_total - 8.0).abs() < 1e-9);

        // Same prompt, different provider
        assert!(cache.get(&JudgmentKey::new("secondary", "abc")).await.is_none());
    }

    #[test]
    fn test_disabled_config_builds_no_cache() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(JudgmentCache::from_config(&config).is_none());
        assert!(JudgmentCache::from_config(&CacheConfig::default()).is_some());
    }
}
