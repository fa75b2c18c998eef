//! Judge evaluators.
//!
//! A judge renders the rubric prompt for a plan, calls its provider
//! through the [`ResilienceManager`], and turns the reply into a
//! validated [`ScoreSet`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use arbiter_core::{Plan, RubricError, ScoreSet};

use crate::cache::JudgmentKey;
use crate::resilience::{prompt_digest, ClassifiedError, ResilienceManager};

pub mod parse;
pub mod prompt;

pub use parse::{extract_json_object, parse_judgment, RawJudgment};
pub use prompt::{render_judge_prompt, JUDGE_SYSTEM_PROMPT};

/// Which seat a judge occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeRole {
    Primary,
    Secondary,
}

impl std::fmt::Display for JudgeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeRole::Primary => write!(f, "primary"),
            JudgeRole::Secondary => write!(f, "secondary"),
        }
    }
}

/// Why a judge produced no score set.
#[derive(Error, Debug, Clone)]
pub enum JudgeFailure {
    #[error(transparent)]
    Provider(#[from] ClassifiedError),

    #[error("Malformed judge response: {0}")]
    MalformedResponse(String),

    #[error("Invalid scores: {0}")]
    InvalidScores(#[from] RubricError),
}

impl JudgeFailure {
    /// Short description for NA reasons.
    pub fn summary(&self) -> String {
        match self {
            JudgeFailure::Provider(err) => format!("{} ({})", err.provider_id, err.kind),
            JudgeFailure::MalformedResponse(_) => "malformed response".to_string(),
            JudgeFailure::InvalidScores(err) => format!("invalid scores: {}", err),
        }
    }
}

/// One of the two judges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judge {
    pub role: JudgeRole,
    pub provider_id: String,
}

impl Judge {
    pub fn new(role: JudgeRole, provider_id: impl Into<String>) -> Self {
        Self {
            role,
            provider_id: provider_id.into(),
        }
    }

    pub fn primary(provider_id: impl Into<String>) -> Self {
        Self::new(JudgeRole::Primary, provider_id)
    }

    pub fn secondary(provider_id: impl Into<String>) -> Self {
        Self::new(JudgeRole::Secondary, provider_id)
    }

    /// Score a plan.
    pub async fn evaluate(
        &self,
        manager: &ResilienceManager,
        plan: &Plan,
    ) -> Result<ScoreSet, JudgeFailure> {
        let prompt = render_judge_prompt(plan);
        let key = JudgmentKey::new(&self.provider_id, prompt_digest(&prompt));

        if let Some(cache) = manager.judgments() {
            if let Some(cached) = cache.get(&key).await {
                // The prompt rounds weights, so rescore against this plan's rubric
                match ScoreSet::new(
                    plan.plan_id.clone(),
                    cached.provider_id,
                    cached.per_criterion_scores,
                    cached.rationale_text,
                    &plan.rubric,
                ) {
                    Ok(score_set) => {
                        tracing::debug!(
                            provider = %self.provider_id,
                            plan_id = %plan.plan_id,
                            "Judgment cache hit"
                        );
                        manager.usage().record_cache_hit(&self.provider_id);
                        return Ok(score_set);
                    }
                    Err(err) => tracing::debug!(
                        provider = %self.provider_id,
                        plan_id = %plan.plan_id,
                        error = %err,
                        "Cached judgment does not fit rubric, re-evaluating"
                    ),
                }
            }
        }

        let completion = manager.invoke_with_retry(&self.provider_id, &prompt).await?;

        let raw = parse_judgment(&completion.text, &plan.rubric).map_err(|reason| {
            tracing::warn!(
                provider = %self.provider_id,
                plan_id = %plan.plan_id,
                reason = %reason,
                "Discarding malformed judgment"
            );
            JudgeFailure::MalformedResponse(reason)
        })?;

        let score_set = ScoreSet::new(
            plan.plan_id.clone(),
            self.provider_id.clone(),
            raw.scores,
            raw.rationale,
            &plan.rubric,
        )?;

        if let Some(cache) = manager.judgments() {
            cache.insert(key, score_set.clone()).await;
        }

        tracing::debug!(
            provider = %self.provider_id,
            role = %self.role,
            plan_id = %plan.plan_id,
            total = score_set.weighted_total,
            "Judge scored plan"
        );
        Ok(score_set)
    }
}
