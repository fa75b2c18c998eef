//! Resilience patterns for provider calls.
//!
//! Retry with backoff, per-attempt timeouts, provider health tracking and
//! usage accounting. Transient failures are absorbed here; callers only
//! ever see a completion or a [`ClassifiedError`].

mod error;
mod fallback;
mod health;
mod manager;
mod retry;
mod usage;

pub use error::{classify, ClassifiedError, FailureKind};
pub use fallback::FallbackOutcome;
pub use health::{HealthRegistry, ProviderHealth, ProviderState};
pub use manager::{Completion, ResilienceManager};
pub use retry::{prompt_digest, AttemptOutcome, EvaluationAttempt, RetryPolicy};
pub use usage::{estimate_cost, LlmUsage, UsageTracker};
