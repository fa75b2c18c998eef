//! Shared evaluation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::rubric::{Rubric, RubricError};

/// A remediation plan submitted for evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Caller-assigned identifier, unique within a batch
    pub plan_id: String,

    /// Extracted plan text
    pub plan_text: String,

    /// Audit findings the plan responds to
    #[serde(default)]
    pub audit_context_text: String,

    /// Rubric the judges score against
    #[serde(default)]
    pub rubric: Rubric,
}

impl Plan {
    /// Create a plan scored against the default rubric.
    pub fn new(
        plan_id: impl Into<String>,
        plan_text: impl Into<String>,
        audit_context_text: impl Into<String>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            plan_text: plan_text.into(),
            audit_context_text: audit_context_text.into(),
            rubric: Rubric::default(),
        }
    }

    /// Use a custom rubric.
    pub fn with_rubric(mut self, rubric: Rubric) -> Self {
        self.rubric = rubric;
        self
    }
}

/// One judge's scores for one plan.
///
/// A judge that fails produces no `ScoreSet` at all, so a zero total
/// always means the judge actually scored the plan at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub plan_id: String,
    pub provider_id: String,
    pub per_criterion_scores: BTreeMap<String, f64>,
    pub weighted_total: f64,
    pub rationale_text: String,
}

impl ScoreSet {
    /// Build a score set, validating scores and computing the weighted total.
    pub fn new(
        plan_id: impl Into<String>,
        provider_id: impl Into<String>,
        per_criterion_scores: BTreeMap<String, f64>,
        rationale_text: impl Into<String>,
        rubric: &Rubric,
    ) -> Result<Self, RubricError> {
        let weighted_total = rubric.weighted_total(&per_criterion_scores)?;

        // Keep only rubric criteria so downstream consumers see a stable key set
        let per_criterion_scores = per_criterion_scores
            .into_iter()
            .filter(|(name, _)| rubric.weight(name).is_some())
            .collect();

        Ok(Self {
            plan_id: plan_id.into(),
            provider_id: provider_id.into(),
            per_criterion_scores,
            weighted_total,
            rationale_text: rationale_text.into(),
        })
    }
}

/// How far apart two judges' weighted totals are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Only one judge produced a score; nothing to reconcile
    None,
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Severity {
    /// Whether a human should look at the reconciled score.
    pub fn requires_review(&self) -> bool {
        matches!(self, Severity::Major | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Minor => write!(f, "minor"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Reconciliation strategy applied to produce the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Average,
    EvidenceWeighted,
    Escalated,
}

impl Strategy {
    /// The strategy for a severity. This is the only place the mapping lives.
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::None | Severity::Minor => Strategy::Average,
            Severity::Moderate => Strategy::EvidenceWeighted,
            Severity::Major | Severity::Critical => Strategy::Escalated,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Average => write!(f, "average"),
            Strategy::EvidenceWeighted => write!(f, "evidence_weighted"),
            Strategy::Escalated => write!(f, "escalated"),
        }
    }
}

/// Reconciled result for one plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub plan_id: String,

    /// Final score on the `[0, 10]` scale, rounded to two decimals
    pub final_score: f64,

    pub severity: Severity,
    pub strategy_applied: Strategy,

    /// Score sets that fed the result (one or two)
    pub contributing_scoresets: Vec<ScoreSet>,

    /// Audit trail of how the score was reached
    pub resolution_notes: String,

    /// Set for Major/Critical disagreements; the score is still final
    pub flagged_for_review: bool,

    /// Absolute difference between totals, when two judges scored
    pub score_difference: Option<f64>,

    /// When the engine produced this result (never used in scoring)
    pub resolved_at: DateTime<Utc>,
}

impl ConsensusResult {
    /// Whether both judges contributed.
    pub fn is_dual(&self) -> bool {
        self.contributing_scoresets.len() == 2
    }
}

/// Which providers were tried before giving up on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAttempted {
    Primary,
    Secondary,
    Both,
    /// The plan never reached a provider (e.g. batch cancelled)
    None,
}

impl fmt::Display for ProviderAttempted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderAttempted::Primary => write!(f, "primary"),
            ProviderAttempted::Secondary => write!(f, "secondary"),
            ProviderAttempted::Both => write!(f, "both"),
            ProviderAttempted::None => write!(f, "none"),
        }
    }
}

/// Why a plan has no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaCause {
    /// No provider could produce a score set
    ProvidersUnavailable,
    /// The batch was cancelled before the plan started
    Cancelled,
    /// The worker evaluating the plan crashed
    WorkerFailed,
}

/// Placeholder for a plan that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaResult {
    pub plan_id: String,

    /// Human-readable reason, rendered as-is in reports
    pub reason: String,

    pub provider_attempted: ProviderAttempted,
    pub cause: NaCause,
}

impl NaResult {
    /// Both judges failed.
    pub fn providers_unavailable(plan_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            reason: reason.into(),
            provider_attempted: ProviderAttempted::Both,
            cause: NaCause::ProvidersUnavailable,
        }
    }

    /// Plan was never launched.
    pub fn cancelled(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            reason: "Batch cancelled before evaluation started".to_string(),
            provider_attempted: ProviderAttempted::None,
            cause: NaCause::Cancelled,
        }
    }

    /// The worker for this plan did not report back.
    pub fn worker_failed(plan_id: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self {
            plan_id: plan_id.into(),
            reason: format!("Evaluation worker failed: {}", detail),
            provider_attempted: ProviderAttempted::None,
            cause: NaCause::WorkerFailed,
        }
    }
}

/// Terminal outcome of one plan's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Scored(ConsensusResult),
    NotAvailable(NaResult),
}

impl PlanOutcome {
    pub fn plan_id(&self) -> &str {
        match self {
            PlanOutcome::Scored(result) => &result.plan_id,
            PlanOutcome::NotAvailable(na) => &na.plan_id,
        }
    }

    pub fn as_scored(&self) -> Option<&ConsensusResult> {
        match self {
            PlanOutcome::Scored(result) => Some(result),
            PlanOutcome::NotAvailable(_) => None,
        }
    }

    pub fn as_na(&self) -> Option<&NaResult> {
        match self {
            PlanOutcome::Scored(_) => None,
            PlanOutcome::NotAvailable(na) => Some(na),
        }
    }
}

impl From<ConsensusResult> for PlanOutcome {
    fn from(result: ConsensusResult) -> Self {
        PlanOutcome::Scored(result)
    }
}

impl From<NaResult> for PlanOutcome {
    fn from(na: NaResult) -> Self {
        PlanOutcome::NotAvailable(na)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scores() -> BTreeMap<String, f64> {
        [
            ("risk_coverage", 8.0),
            ("feasibility", 7.0),
            ("compliance_alignment", 6.0),
            ("clarity", 9.0),
            ("extra", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_score_set_drops_unknown_criteria() {
        let set = ScoreSet::new("p1", "a", sample_scores(), "ok", &Rubric::default()).unwrap();
        assert_eq!(set.per_criterion_scores.len(), 4);
        assert!(!set.per_criterion_scores.contains_key("extra"));
        // 3.2 + 2.1 + 1.2 + 0.9
        assert!((set.weighted_total - 7.4).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_mapping() {
        assert_eq!(Strategy::for_severity(Severity::None), Strategy::Average);
        assert_eq!(Strategy::for_severity(Severity::Minor), Strategy::Average);
        assert_eq!(Strategy::for_severity(Severity::Moderate), Strategy::EvidenceWeighted);
        assert_eq!(Strategy::for_severity(Severity::Major), Strategy::Escalated);
        assert_eq!(Strategy::for_severity(Severity::Critical), Strategy::Escalated);
    }

    #[test]
    fn test_plan_outcome_serialization_is_tagged() {
        let na = PlanOutcome::from(NaResult::providers_unavailable("p9", "both down"));
        let json = serde_json::to_value(&na).unwrap();
        assert_eq!(json["outcome"], "not_available");
        assert_eq!(json["provider_attempted"], "both");
        assert_eq!(json["reason"], "both down");
    }

    #[test]
    fn test_plan_deserializes_with_default_rubric() {
        let plan: Plan =
            serde_json::from_str(r#"{"plan_id": "p1", "plan_text": "Patch servers"}"#).unwrap();
        assert_eq!(plan.rubric, Rubric::default());
        assert!(plan.audit_context_text.is_empty());
    }
}
