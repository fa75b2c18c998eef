//! Consensus engine: reconciles two judges' score sets into one final score.
//!
//! Reconciliation rules (applied in order):
//! 1. One score set → severity `None`, the judge's total is final (`Average`)
//! 2. `diff < minor_max` → `Minor`, simple average
//! 3. `diff < moderate_max` → `Moderate`, evidence-weighted blend
//! 4. Otherwise → `Major` or `Critical`, evidence-biased blend flagged for review
//!
//! Equal evidence quality always falls back to the simple average.
//! The engine is pure: no randomness, no clock reads in the scoring path.

use chrono::Utc;
use thiserror::Error;

use crate::evidence::{EvidenceScorer, HeuristicEvidenceScorer};
use crate::rubric::Rubric;
use crate::types::{ConsensusResult, ScoreSet, Severity, Strategy};

/// Differences are compared at this precision so 8.3 - 6.3 classifies as 2.0.
const DIFF_PRECISION: f64 = 1e6;

const QUALITY_EPSILON: f64 = 1e-9;

/// Errors from the consensus engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("No score sets to reconcile for plan {0}")]
    NoScoreSets(String),

    #[error("Score set for plan {found} passed to consensus for plan {expected}")]
    PlanMismatch { expected: String, found: String },
}

/// Severity thresholds on the absolute difference of weighted totals.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConsensusThresholds {
    /// Differences below this are Minor
    pub minor_max: f64,

    /// Differences below this (and at least `minor_max`) are Moderate
    pub moderate_max: f64,

    /// Differences at or above this are Critical rather than Major
    pub critical_min: f64,
}

impl Default for ConsensusThresholds {
    fn default() -> Self {
        Self {
            minor_max: 2.0,
            moderate_max: 3.0,
            critical_min: 5.0,
        }
    }
}

/// The consensus engine.
pub struct ConsensusEngine {
    thresholds: ConsensusThresholds,
    scorer: Box<dyn EvidenceScorer>,
}

impl ConsensusEngine {
    /// Engine with default thresholds and the heuristic evidence scorer.
    pub fn new() -> Self {
        Self::with_scorer(
            ConsensusThresholds::default(),
            Box::new(HeuristicEvidenceScorer::default()),
        )
    }

    pub fn with_thresholds(thresholds: ConsensusThresholds) -> Self {
        Self::with_scorer(thresholds, Box::new(HeuristicEvidenceScorer::default()))
    }

    pub fn with_scorer(thresholds: ConsensusThresholds, scorer: Box<dyn EvidenceScorer>) -> Self {
        Self { thresholds, scorer }
    }

    pub fn thresholds(&self) -> &ConsensusThresholds {
        &self.thresholds
    }

    /// Classify a (non-negative) difference between two totals.
    pub fn classify(&self, diff: f64) -> Severity {
        let diff = normalize_diff(diff);
        if diff < self.thresholds.minor_max {
            Severity::Minor
        } else if diff < self.thresholds.moderate_max {
            Severity::Moderate
        } else if diff < self.thresholds.critical_min {
            Severity::Major
        } else {
            Severity::Critical
        }
    }

    /// Reconcile whatever score sets are present for a plan.
    ///
    /// Callers short-circuit to an NA result when both are absent; this
    /// returns [`ConsensusError::NoScoreSets`] if they do not.
    pub fn reconcile(
        &self,
        plan_id: &str,
        rubric: &Rubric,
        primary: Option<ScoreSet>,
        secondary: Option<ScoreSet>,
    ) -> Result<ConsensusResult, ConsensusError> {
        for set in primary.iter().chain(secondary.iter()) {
            if set.plan_id != plan_id {
                return Err(ConsensusError::PlanMismatch {
                    expected: plan_id.to_string(),
                    found: set.plan_id.clone(),
                });
            }
        }

        match (primary, secondary) {
            (Some(a), Some(b)) => Ok(self.reconcile_pair(plan_id, rubric, a, b)),
            (Some(only), None) | (None, Some(only)) => Ok(self.single(plan_id, only)),
            (None, None) => Err(ConsensusError::NoScoreSets(plan_id.to_string())),
        }
    }

    fn single(&self, plan_id: &str, only: ScoreSet) -> ConsensusResult {
        let final_score = round2(only.weighted_total);
        let notes = format!(
            "Single judge available ({}); final score {:.2} taken directly.",
            only.provider_id, final_score
        );

        ConsensusResult {
            plan_id: plan_id.to_string(),
            final_score,
            severity: Severity::None,
            strategy_applied: Strategy::for_severity(Severity::None),
            contributing_scoresets: vec![only],
            resolution_notes: notes,
            flagged_for_review: false,
            score_difference: None,
            resolved_at: Utc::now(),
        }
    }

    fn reconcile_pair(
        &self,
        plan_id: &str,
        rubric: &Rubric,
        a: ScoreSet,
        b: ScoreSet,
    ) -> ConsensusResult {
        let diff = normalize_diff((a.weighted_total - b.weighted_total).abs());
        let severity = self.classify(diff);
        let strategy = Strategy::for_severity(severity);

        let mut notes = format!(
            "Judges {} ({:.2}) and {} ({:.2}) differ by {:.2} ({}).",
            a.provider_id, a.weighted_total, b.provider_id, b.weighted_total, diff, severity
        );

        let final_score = match strategy {
            Strategy::Average => {
                let avg = simple_average(&a, &b);
                notes.push_str(&format!(" Simple average {:.2}.", round2(avg)));
                avg
            }
            Strategy::EvidenceWeighted | Strategy::Escalated => {
                let blended = self.evidence_blend(rubric, &a, &b, &mut notes);
                if strategy == Strategy::Escalated {
                    notes.push_str(" Flagged for human review.");
                }
                blended
            }
        };

        tracing::debug!(
            plan_id,
            severity = %severity,
            strategy = %strategy,
            final_score,
            "Consensus reached"
        );

        ConsensusResult {
            plan_id: plan_id.to_string(),
            final_score: round2(final_score),
            severity,
            strategy_applied: strategy,
            contributing_scoresets: vec![a, b],
            resolution_notes: notes,
            flagged_for_review: severity.requires_review(),
            score_difference: Some(diff),
            resolved_at: Utc::now(),
        }
    }

    /// Blend the two totals by evidence quality, falling back to the
    /// average when qualities tie.
    fn evidence_blend(
        &self,
        rubric: &Rubric,
        a: &ScoreSet,
        b: &ScoreSet,
        notes: &mut String,
    ) -> f64 {
        let qa = self.scorer.score(&a.rationale_text, rubric).clamp(0.0, 1.0);
        let qb = self.scorer.score(&b.rationale_text, rubric).clamp(0.0, 1.0);

        if (qa - qb).abs() < QUALITY_EPSILON {
            let avg = simple_average(a, b);
            notes.push_str(&format!(
                " Evidence quality tied at {:.2}; simple average {:.2}.",
                qa,
                round2(avg)
            ));
            return avg;
        }

        let blended = (qa * a.weighted_total + qb * b.weighted_total) / (qa + qb);
        let favoured = if qa > qb { &a.provider_id } else { &b.provider_id };
        notes.push_str(&format!(
            " Evidence quality {}={:.2}, {}={:.2}; blend favours {}: {:.2}.",
            a.provider_id,
            qa,
            b.provider_id,
            qb,
            favoured,
            round2(blended)
        ));
        blended
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn simple_average(a: &ScoreSet, b: &ScoreSet) -> f64 {
    (a.weighted_total + b.weighted_total) / 2.0
}

fn normalize_diff(diff: f64) -> f64 {
    (diff.abs() * DIFF_PRECISION).round() / DIFF_PRECISION
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strategy;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Score set whose weighted total equals `total` (all criteria scored alike).
    fn set(provider: &str, total: f64, rationale: &str) -> ScoreSet {
        let rubric = Rubric::default();
        let scores: BTreeMap<String, f64> = rubric
            .names()
            .map(|name| (name.to_string(), total))
            .collect();
        let mut set = ScoreSet::new("plan-1", provider, scores, rationale, &rubric).unwrap();
        // Pin the total exactly so boundary tests aren't at the mercy of weight rounding
        set.weighted_total = total;
        set
    }

    struct FixedScorer(f64, f64);

    impl EvidenceScorer for FixedScorer {
        fn score(&self, rationale_text: &str, _rubric: &Rubric) -> f64 {
            if rationale_text == "a" {
                self.0
            } else {
                self.1
            }
        }
    }

    fn engine_with(qa: f64, qb: f64) -> ConsensusEngine {
        ConsensusEngine::with_scorer(ConsensusThresholds::default(), Box::new(FixedScorer(qa, qb)))
    }

    fn reconcile(engine: &ConsensusEngine, a: f64, b: f64) -> ConsensusResult {
        engine
            .reconcile(
                "plan-1",
                &Rubric::default(),
                Some(set("judge-a", a, "a")),
                Some(set("judge-b", b, "b")),
            )
            .unwrap()
    }

    #[test]
    fn test_severity_boundaries() {
        let engine = ConsensusEngine::new();
        assert_eq!(engine.classify(1.99), Severity::Minor);
        assert_eq!(engine.classify(2.00), Severity::Moderate);
        assert_eq!(engine.classify(2.99), Severity::Moderate);
        assert_eq!(engine.classify(3.00), Severity::Major);
        assert_eq!(engine.classify(4.99), Severity::Major);
        assert_eq!(engine.classify(5.00), Severity::Critical);
    }

    #[test]
    fn test_float_noise_does_not_shift_boundary() {
        let engine = ConsensusEngine::new();
        // 8.3 - 6.3 == 2.0000000000000009 in f64
        assert_eq!(engine.classify(8.3 - 6.3), Severity::Moderate);
        // 7.3 - 5.3 == 1.9999999999999996 in f64
        assert_eq!(engine.classify(7.3 - 5.3), Severity::Moderate);
    }

    #[test]
    fn test_pair_boundaries_end_to_end() {
        let engine = engine_with(0.5, 0.5);
        assert_eq!(reconcile(&engine, 7.99, 6.0).severity, Severity::Minor);
        assert_eq!(reconcile(&engine, 8.0, 6.0).severity, Severity::Moderate);
        assert_eq!(reconcile(&engine, 8.99, 6.0).severity, Severity::Moderate);
        assert_eq!(reconcile(&engine, 9.0, 6.0).severity, Severity::Major);
    }

    #[test]
    fn test_minor_is_simple_average() {
        let result = reconcile(&engine_with(0.9, 0.1), 7.0, 6.0);
        assert_eq!(result.strategy_applied, Strategy::Average);
        assert_eq!(result.final_score, 6.5);
        assert!(!result.flagged_for_review);
        assert_eq!(result.contributing_scoresets.len(), 2);
    }

    #[test]
    fn test_moderate_favours_higher_evidence() {
        let result = reconcile(&engine_with(0.75, 0.25), 8.5, 6.0);
        assert_eq!(result.severity, Severity::Moderate);
        assert_eq!(result.strategy_applied, Strategy::EvidenceWeighted);
        // (0.75 * 8.5 + 0.25 * 6.0) / 1.0
        assert_eq!(result.final_score, 7.88);
        assert!(result.resolution_notes.contains("favours judge-a"));
    }

    #[test]
    fn test_moderate_tie_falls_back_to_average() {
        let result = reconcile(&engine_with(0.4, 0.4), 8.5, 6.0);
        assert_eq!(result.strategy_applied, Strategy::EvidenceWeighted);
        assert_eq!(result.final_score, 7.25);
        assert!(result.resolution_notes.contains("tied"));
    }

    #[test]
    fn test_zero_evidence_on_both_sides_is_a_tie() {
        let result = reconcile(&engine_with(0.0, 0.0), 8.5, 6.0);
        assert_eq!(result.final_score, 7.25);
    }

    #[test]
    fn test_major_is_escalated_but_scored() {
        let result = reconcile(&engine_with(0.2, 0.6), 9.0, 5.0);
        assert_eq!(result.severity, Severity::Major);
        assert_eq!(result.strategy_applied, Strategy::Escalated);
        assert!(result.flagged_for_review);
        // (0.2 * 9 + 0.6 * 5) / 0.8 = 6.0
        assert_eq!(result.final_score, 6.0);
    }

    #[test]
    fn test_critical_disagreement() {
        let result = reconcile(&engine_with(0.5, 0.5), 9.5, 2.0);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.strategy_applied, Strategy::Escalated);
        assert_eq!(result.score_difference, Some(7.5));
    }

    #[test]
    fn test_single_judge() {
        let engine = ConsensusEngine::new();
        let result = engine
            .reconcile("plan-1", &Rubric::default(), None, Some(set("judge-b", 6.4, "b")))
            .unwrap();
        assert_eq!(result.severity, Severity::None);
        assert_eq!(result.strategy_applied, Strategy::Average);
        assert_eq!(result.final_score, 6.4);
        assert_eq!(result.contributing_scoresets.len(), 1);
        assert_eq!(result.score_difference, None);
    }

    #[test]
    fn test_single_zero_score_is_kept() {
        let engine = ConsensusEngine::new();
        let result = engine
            .reconcile("plan-1", &Rubric::default(), Some(set("judge-a", 0.0, "a")), None)
            .unwrap();
        assert_eq!(result.final_score, 0.0);
    }

    #[test]
    fn test_no_score_sets_is_error() {
        let engine = ConsensusEngine::new();
        let result = engine.reconcile("plan-1", &Rubric::default(), None, None);
        assert_eq!(result.unwrap_err(), ConsensusError::NoScoreSets("plan-1".to_string()));
    }

    #[test]
    fn test_plan_mismatch_is_error() {
        let engine = ConsensusEngine::new();
        let mut other = set("judge-a", 5.0, "a");
        other.plan_id = "plan-2".to_string();
        let result = engine.reconcile("plan-1", &Rubric::default(), Some(other), None);
        assert!(matches!(result, Err(ConsensusError::PlanMismatch { .. })));
    }

    #[test]
    fn test_custom_thresholds() {
        let engine = ConsensusEngine::with_thresholds(ConsensusThresholds {
            minor_max: 1.0,
            moderate_max: 1.5,
            critical_min: 2.0,
        });
        assert_eq!(engine.classify(1.2), Severity::Moderate);
        assert_eq!(engine.classify(2.5), Severity::Critical);
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_deterministic(a in 0.0f64..=10.0, b in 0.0f64..=10.0) {
            let engine = ConsensusEngine::new();
            let rubric = Rubric::default();
            let first = engine
                .reconcile(
                    "plan-1",
                    &rubric,
                    Some(set("x", a, "30 days, section 4")),
                    Some(set("y", b, "ok")),
                )
                .unwrap();
            let second = engine
                .reconcile(
                    "plan-1",
                    &rubric,
                    Some(set("x", a, "30 days, section 4")),
                    Some(set("y", b, "ok")),
                )
                .unwrap();

            prop_assert_eq!(first.final_score, second.final_score);
            prop_assert_eq!(first.severity, second.severity);
            prop_assert_eq!(first.strategy_applied, second.strategy_applied);
            prop_assert_eq!(first.resolution_notes, second.resolution_notes);
        }

        #[test]
        fn prop_final_score_between_inputs(
            a in 0.0f64..=10.0,
            b in 0.0f64..=10.0,
            qa in 0.0f64..=1.0,
            qb in 0.0f64..=1.0,
        ) {
            let result = reconcile(&engine_with(qa, qb), a, b);
            let lo = a.min(b) - 0.005;
            let hi = a.max(b) + 0.005;
            prop_assert!(result.final_score >= lo && result.final_score <= hi);
        }

        #[test]
        fn prop_severity_is_monotonic(d1 in 0.0f64..=10.0, d2 in 0.0f64..=10.0) {
            let engine = ConsensusEngine::new();
            let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
            prop_assert!(engine.classify(lo) <= engine.classify(hi));
        }

        #[test]
        fn prop_strategy_follows_severity(a in 0.0f64..=10.0, b in 0.0f64..=10.0) {
            let result = reconcile(&ConsensusEngine::new(), a, b);
            prop_assert_eq!(result.strategy_applied, Strategy::for_severity(result.severity));
        }
    }
}
