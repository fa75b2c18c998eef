//! Batch-level aggregate over per-plan outcomes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{ConsensusResult, NaCause, PlanOutcome};

/// Aggregate result of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total_plans: usize,

    /// Plans with a consensus result
    pub completed: usize,

    /// Plans that no provider could score
    pub unavailable: usize,

    /// Plans that never finished (cancelled or crashed worker)
    pub failed: usize,

    pub per_plan: Vec<PlanOutcome>,

    /// Share of plans with a consensus result, 0-100
    pub completion_percentage: f64,
}

/// A scored plan with its position in the ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankedPlan<'a> {
    /// 1-based rank, highest score first
    pub rank: usize,
    pub result: &'a ConsensusResult,
}

impl BatchResult {
    /// Finalize a batch from its outcomes.
    pub fn from_outcomes(total_plans: usize, per_plan: Vec<PlanOutcome>) -> Self {
        let mut completed = 0;
        let mut unavailable = 0;
        let mut failed = 0;

        for outcome in &per_plan {
            match outcome {
                PlanOutcome::Scored(_) => completed += 1,
                PlanOutcome::NotAvailable(na) => match na.cause {
                    NaCause::ProvidersUnavailable => unavailable += 1,
                    NaCause::Cancelled | NaCause::WorkerFailed => failed += 1,
                },
            }
        }

        let completion_percentage = if total_plans == 0 {
            100.0
        } else {
            ((completed as f64 / total_plans as f64) * 10_000.0).round() / 100.0
        };

        Self {
            total_plans,
            completed,
            unavailable,
            failed,
            per_plan,
            completion_percentage,
        }
    }

    /// Look up a plan's outcome.
    pub fn outcome(&self, plan_id: &str) -> Option<&PlanOutcome> {
        self.per_plan.iter().find(|o| o.plan_id() == plan_id)
    }

    /// Scored plans, best first. Ties are broken by plan id.
    pub fn ranked(&self) -> Vec<RankedPlan<'_>> {
        let mut scored: Vec<&ConsensusResult> =
            self.per_plan.iter().filter_map(PlanOutcome::as_scored).collect();

        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.plan_id.cmp(&b.plan_id))
        });

        scored
            .into_iter()
            .enumerate()
            .map(|(idx, result)| RankedPlan {
                rank: idx + 1,
                result,
            })
            .collect()
    }

    /// Scored plans flagged for human review.
    pub fn flagged_for_review(&self) -> Vec<&ConsensusResult> {
        self.per_plan
            .iter()
            .filter_map(PlanOutcome::as_scored)
            .filter(|r| r.flagged_for_review)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NaResult, Severity, Strategy};
    use chrono::Utc;

    fn scored(plan_id: &str, score: f64, flagged: bool) -> PlanOutcome {
        PlanOutcome::Scored(ConsensusResult {
            plan_id: plan_id.to_string(),
            final_score: score,
            severity: if flagged { Severity::Major } else { Severity::Minor },
            strategy_applied: if flagged { Strategy::Escalated } else { Strategy::Average },
            contributing_scoresets: vec![],
            resolution_notes: String::new(),
            flagged_for_review: flagged,
            score_difference: None,
            resolved_at: Utc::now(),
        })
    }

    #[test]
    fn test_counts_and_percentage() {
        let batch = BatchResult::from_outcomes(
            4,
            vec![
                scored("p1", 7.0, false),
                scored("p2", 5.0, true),
                NaResult::providers_unavailable("p3", "down").into(),
                NaResult::cancelled("p4").into(),
            ],
        );

        assert_eq!(batch.completed, 2);
        assert_eq!(batch.unavailable, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.completion_percentage, 50.0);
        assert_eq!(batch.flagged_for_review().len(), 1);
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let batch = BatchResult::from_outcomes(0, vec![]);
        assert_eq!(batch.completion_percentage, 100.0);
        assert!(batch.ranked().is_empty());
    }

    #[test]
    fn test_ranking_orders_by_score_then_id() {
        let batch = BatchResult::from_outcomes(
            4,
            vec![
                scored("p-b", 6.0, false),
                NaResult::providers_unavailable("p-x", "down").into(),
                scored("p-c", 8.25, false),
                scored("p-a", 6.0, false),
            ],
        );

        let ranked: Vec<(usize, &str)> = batch
            .ranked()
            .iter()
            .map(|r| (r.rank, r.result.plan_id.as_str()))
            .collect();
        assert_eq!(ranked, vec![(1, "p-c"), (2, "p-a"), (3, "p-b")]);
    }

    #[test]
    fn test_percentage_rounding() {
        let batch = BatchResult::from_outcomes(
            3,
            vec![
                scored("p1", 7.0, false),
                NaResult::providers_unavailable("p2", "down").into(),
                NaResult::providers_unavailable("p3", "down").into(),
            ],
        );
        assert_eq!(batch.completion_percentage, 33.33);
    }
}
