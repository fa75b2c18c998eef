//! Primary-then-secondary evaluation.

use serde::Serialize;

use arbiter_core::{NaResult, Plan, ScoreSet};

use super::manager::ResilienceManager;
use crate::judges::Judge;

/// Result of trying both judges in turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackOutcome {
    Scored(ScoreSet),
    NotAvailable(NaResult),
}

impl FallbackOutcome {
    pub fn score_set(&self) -> Option<&ScoreSet> {
        match self {
            FallbackOutcome::Scored(set) => Some(set),
            FallbackOutcome::NotAvailable(_) => None,
        }
    }
}

impl ResilienceManager {
    /// Score a plan with the primary judge, falling back to the secondary.
    ///
    /// The secondary is only called when the primary fails.
    pub async fn evaluate_with_fallback(
        &self,
        plan: &Plan,
        primary: &Judge,
        secondary: &Judge,
    ) -> FallbackOutcome {
        let primary_failure = match primary.evaluate(self, plan).await {
            Ok(set) => return FallbackOutcome::Scored(set),
            Err(failure) => failure,
        };

        tracing::debug!(
            plan_id = %plan.plan_id,
            provider = %primary.provider_id,
            error = %primary_failure,
            "Primary judge failed, trying secondary"
        );

        match secondary.evaluate(self, plan).await {
            Ok(set) => FallbackOutcome::Scored(set),
            Err(secondary_failure) => {
                tracing::warn!(plan_id = %plan.plan_id, "Both judges failed");
                FallbackOutcome::NotAvailable(NaResult::providers_unavailable(
                    plan.plan_id.clone(),
                    format!(
                        "Both judges failed: {}; {}",
                        primary_failure.summary(),
                        secondary_failure.summary()
                    ),
                ))
            }
        }
    }
}
