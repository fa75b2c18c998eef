//! Weighted scoring rubric.
//!
//! Every plan is judged against exactly four named criteria whose weights
//! sum to 1.0. Judges report a `[0, 10]` score per criterion and the
//! weighted total is always recomputed here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Number of criteria a rubric must carry.
pub const CRITERIA_COUNT: usize = 4;

/// Lowest score a judge may assign to a criterion.
pub const MIN_SCORE: f64 = 0.0;

/// Highest score a judge may assign to a criterion.
pub const MAX_SCORE: f64 = 10.0;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Errors raised while building a rubric or scoring against it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RubricError {
    #[error("Rubric must have exactly 4 criteria, got {0}")]
    WrongCriteriaCount(usize),

    #[error("Criterion name must not be empty")]
    EmptyName,

    #[error("Duplicate criterion: {0}")]
    DuplicateCriterion(String),

    #[error("Weight for '{name}' must be within [0, 1], got {weight}")]
    WeightOutOfRange { name: String, weight: f64 },

    #[error("Rubric weights must sum to 1.0, got {0}")]
    WeightsDoNotSumToOne(f64),

    #[error("Missing score for criterion '{0}'")]
    MissingScore(String),

    #[error("Score for '{name}' must be within [0, 10], got {score}")]
    ScoreOutOfRange { name: String, score: f64 },
}

/// A single weighted criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Stable identifier used as the key in score maps (e.g. "feasibility")
    pub name: String,

    /// Weight in `[0, 1]`
    pub weight: f64,

    /// What the judge should assess, rendered into prompts
    #[serde(default)]
    pub description: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, weight: f64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight,
            description: description.into(),
        }
    }
}

/// A validated four-criterion rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Criterion>", into = "Vec<Criterion>")]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    /// Build a rubric, validating names and weights.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, RubricError> {
        if criteria.len() != CRITERIA_COUNT {
            return Err(RubricError::WrongCriteriaCount(criteria.len()));
        }

        let mut seen = BTreeSet::new();
        for criterion in &criteria {
            if criterion.name.trim().is_empty() {
                return Err(RubricError::EmptyName);
            }
            if !seen.insert(criterion.name.as_str()) {
                return Err(RubricError::DuplicateCriterion(criterion.name.clone()));
            }
            if !criterion.weight.is_finite() || !(0.0..=1.0).contains(&criterion.weight) {
                return Err(RubricError::WeightOutOfRange {
                    name: criterion.name.clone(),
                    weight: criterion.weight,
                });
            }
        }

        let total: f64 = criteria.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RubricError::WeightsDoNotSumToOne(total));
        }

        Ok(Self { criteria })
    }

    /// Criteria in declaration order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Criterion names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }

    /// Weight of a criterion, if present.
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.criteria
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.weight)
    }

    /// Validate a judge's per-criterion scores and compute the weighted total.
    ///
    /// Extra keys are ignored; every rubric criterion must be present
    /// with a finite score in `[0, 10]`.
    pub fn weighted_total(&self, scores: &BTreeMap<String, f64>) -> Result<f64, RubricError> {
        let mut total = 0.0;
        for criterion in &self.criteria {
            let score = *scores
                .get(&criterion.name)
                .ok_or_else(|| RubricError::MissingScore(criterion.name.clone()))?;

            if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                return Err(RubricError::ScoreOutOfRange {
                    name: criterion.name.clone(),
                    score,
                });
            }
            total += score * criterion.weight;
        }
        Ok(total)
    }
}

impl Default for Rubric {
    /// Remediation-plan rubric weighted 0.40 / 0.30 / 0.20 / 0.10.
    fn default() -> Self {
        Self {
            criteria: vec![
                Criterion::new(
                    "risk_coverage",
                    0.40,
                    "How completely the plan addresses every audit finding and its root cause",
                ),
                Criterion::new(
                    "feasibility",
                    0.30,
                    "Whether timelines, owners and resources are realistic",
                ),
                Criterion::new(
                    "compliance_alignment",
                    0.20,
                    "Alignment with the cited regulatory and control requirements",
                ),
                Criterion::new(
                    "clarity",
                    0.10,
                    "How specific, measurable and unambiguous the actions are",
                ),
            ],
        }
    }
}

impl TryFrom<Vec<Criterion>> for Rubric {
    type Error = RubricError;

    fn try_from(criteria: Vec<Criterion>) -> Result<Self, Self::Error> {
        Self::new(criteria)
    }
}

impl From<Rubric> for Vec<Criterion> {
    fn from(rubric: Rubric) -> Self {
        rubric.criteria
    }
}
