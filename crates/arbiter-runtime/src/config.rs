//! Runtime configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty document is a
//! valid configuration. Durations are written as humantime strings
//! (`"2s"`, `"1m 30s"`).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use arbiter_core::ConsensusThresholds;

use crate::providers::CompletionConfig;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Total attempts per provider call, including the first
    pub max_retries: u32,

    /// Base delay between attempts
    #[serde(with = "duration_str")]
    pub retry_delay: Duration,

    /// Double the delay after every attempt
    pub exponential_backoff: bool,

    /// Cap on a single backoff delay
    #[serde(with = "duration_str")]
    pub max_retry_delay: Duration,

    /// Bound on a single attempt
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Judges' providers that must pass the pre-batch probe
    pub minimum_provider_requirement: usize,

    pub worker_pool_size: usize,

    /// Consecutive failed invocations before a provider is unavailable
    pub failure_threshold: u32,

    pub cache: CacheConfig,
    pub consensus: ConsensusThresholds,
    pub completion: CompletionConfig,
    pub judges: JudgesConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            exponential_backoff: true,
            max_retry_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            minimum_provider_requirement: 1,
            worker_pool_size: 4,
            failure_threshold: 3,
            cache: CacheConfig::default(),
            consensus: ConsensusThresholds::default(),
            completion: CompletionConfig::default(),
            judges: JudgesConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.minimum_provider_requirement > 2 {
            return Err(ConfigError::Invalid(format!(
                "minimum_provider_requirement is {} but only 2 judges exist",
                self.minimum_provider_requirement
            )));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".to_string()));
        }

        let t = &self.consensus;
        if !(t.minor_max > 0.0
            && t.minor_max <= t.moderate_max
            && t.moderate_max <= t.critical_min)
        {
            return Err(ConfigError::Invalid(format!(
                "consensus thresholds must satisfy 0 < minor_max <= moderate_max <= critical_min, got {}/{}/{}",
                t.minor_max, t.moderate_max, t.critical_min
            )));
        }

        if self.judges.primary.id == self.judges.secondary.id {
            return Err(ConfigError::Invalid(format!(
                "primary and secondary judges share provider id '{}'",
                self.judges.primary.id
            )));
        }

        Ok(())
    }
}

/// Judgment cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Provider behind each judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgesConfig {
    pub primary: ProviderSpec,
    pub secondary: ProviderSpec,
}

impl Default for JudgesConfig {
    fn default() -> Self {
        Self {
            primary: ProviderSpec::new("primary", "anthropic"),
            secondary: ProviderSpec::new("secondary", "openai"),
        }
    }
}

/// A provider instance: registry type plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Id used in health, usage and score sets
    pub id: String,

    /// Registry type, e.g. "anthropic"
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(default = "empty_settings")]
    pub settings: JsonValue,
}

impl ProviderSpec {
    pub fn new(id: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_type: provider_type.into(),
            settings: empty_settings(),
        }
    }

    pub fn with_settings(mut self, settings: JsonValue) -> Self {
        self.settings = settings;
        self
    }
}

fn empty_settings() -> JsonValue {
    JsonValue::Object(Default::default())
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
