//! # arbiter-runtime
//!
//! Async evaluation runtime for Arbiter.
//!
//! Scores remediation plans with two independent LLM judges and reconciles
//! them with the deterministic consensus engine from `arbiter-core`.
//!
//! - [`providers`]: provider trait, HTTP adapters, scripted provider
//! - [`resilience`]: retry, timeout, health and usage tracking
//! - [`judges`]: prompt rendering and reply parsing
//! - [`scheduler`]: bounded-concurrency batch execution
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_runtime::{BatchScheduler, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("arbiter.yaml")?;
//! let scheduler = BatchScheduler::from_config(config, &ProviderRegistry::with_defaults())?;
//! let result = scheduler.submit_batch(plans).await;
//! println!("{}/{} plans scored", result.completed, result.total_plans);
//! ```

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod judges;
pub mod providers;
pub mod resilience;
pub mod scheduler;

pub use cache::{JudgmentCache, JudgmentKey};
pub use config::{CacheConfig, ConfigError, JudgesConfig, ProviderSpec, RuntimeConfig};
pub use judges::{Judge, JudgeFailure, JudgeRole};
pub use providers::{
    CompletionConfig, LlmProvider, ProviderError, ProviderRegistry, ScriptedProvider,
    ScriptedReply,
};
pub use resilience::{
    ClassifiedError, FailureKind, FallbackOutcome, HealthRegistry, ProviderState,
    ResilienceManager, UsageTracker,
};
pub use scheduler::{BatchProgress, BatchScheduler, BatchSchedulerBuilder, CancellationHandle};

/// Errors building the runtime.
///
/// Evaluation itself never fails: provider problems end up as NA outcomes.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Runtime not configured: {0}")]
    NotConfigured(String),
}
