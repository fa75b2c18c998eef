//! # arbiter-core
//!
//! Deterministic scoring model for dual-judge remediation plan evaluation.
//!
//! This crate owns everything about a plan's score that does not involve
//! talking to an LLM:
//! - the weighted four-criterion [`Rubric`]
//! - judge output as [`ScoreSet`]s
//! - the [`ConsensusEngine`] that reconciles two judges into one score
//! - the [`BatchResult`] aggregate and ranking
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: identical score sets always reconcile identically
//! 2. **No LLM calls**: provider access lives in `arbiter-runtime`
//! 3. **Absence is not zero**: a failed judge yields no `ScoreSet`
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_core::{ConsensusEngine, Rubric};
//!
//! let engine = ConsensusEngine::new();
//! let result = engine.reconcile("plan-7", &Rubric::default(), Some(primary), Some(secondary))?;
//! println!("{} -> {:.2} ({})", result.plan_id, result.final_score, result.strategy_applied);
//! ```

pub mod batch;
pub mod consensus;
pub mod evidence;
pub mod rubric;
pub mod types;

pub use batch::{BatchResult, RankedPlan};
pub use consensus::{ConsensusEngine, ConsensusError, ConsensusThresholds};
pub use evidence::{EvidenceScorer, HeuristicEvidenceScorer};
pub use rubric::{Criterion, Rubric, RubricError, CRITERIA_COUNT, MAX_SCORE, MIN_SCORE};
pub use types::{
    ConsensusResult, NaCause, NaResult, Plan, PlanOutcome, ProviderAttempted, ScoreSet, Severity,
    Strategy,
};
