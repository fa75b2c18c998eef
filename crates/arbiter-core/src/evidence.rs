//! Evidence quality scoring for judge rationales.
//!
//! When two judges disagree moderately, the consensus engine leans toward
//! the judge whose rationale is better supported. The scorer is pluggable:
//! any [`EvidenceScorer`] maps rationale text to a quality in `[0, 1]`.
//!
//! The default [`HeuristicEvidenceScorer`] looks at three signals:
//! - concrete evidence markers (quantities, dates, control references, quotations)
//! - length above a floor
//! - criterion-by-criterion justification

use lazy_static::lazy_static;
use regex::Regex;

use crate::rubric::Rubric;

lazy_static! {
    /// Quantities with units: "30 days", "95%", "12 servers"
    static ref QUANTITY_PATTERN: Regex = Regex::new(
        r"(?i)\b\d+(?:\.\d+)?\s*(?:%|percent|days?|weeks?|months?|hours?|servers?|hosts?|systems?|controls?|findings?)\b|\b\d+(?:\.\d+)?%"
    ).unwrap();

    /// ISO dates, quarters, and month-year references
    static ref DATE_PATTERN: Regex = Regex::new(
        r"(?i)\b\d{4}-\d{2}-\d{2}\b|\bQ[1-4]\s*\d{4}\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}\b"
    ).unwrap();

    /// Section, control, finding, or standard references: "section 4.2", "AC-2", "ISO 27001"
    static ref REFERENCE_PATTERN: Regex = Regex::new(
        r"(?i)\b(?:section|clause|control|finding|requirement|page|step)\s+#?[A-Z]?\d+(?:\.\d+)*\b|§\s*\d+|\b[A-Z]{2,4}-\d{1,3}\b|\b(?:ISO|SOC|NIST|PCI|HIPAA|GDPR)\b"
    ).unwrap();

    /// Direct quotations of at least a few words
    static ref QUOTE_PATTERN: Regex = Regex::new(
        r#""[^"]{12,}"|“[^”]{12,}”"#
    ).unwrap();
}

/// Scores how well a rationale is supported by evidence.
///
/// # Contract
/// - Output is always within `[0, 1]`
/// - Same input always produces the same output
/// - The rubric is context only (e.g. to check criterion coverage)
pub trait EvidenceScorer: Send + Sync {
    fn score(&self, rationale_text: &str, rubric: &Rubric) -> f64;
}

/// Keyword and length based evidence scorer.
#[derive(Debug, Clone)]
pub struct HeuristicEvidenceScorer {
    /// Weight of the evidence-marker signal
    pub marker_weight: f64,

    /// Weight of the length signal
    pub length_weight: f64,

    /// Weight of the criterion-coverage signal
    pub coverage_weight: f64,

    /// Word count at which the length signal saturates
    pub length_floor_words: usize,
}

impl Default for HeuristicEvidenceScorer {
    fn default() -> Self {
        Self {
            marker_weight: 0.5,
            length_weight: 0.2,
            coverage_weight: 0.3,
            length_floor_words: 60,
        }
    }
}

impl HeuristicEvidenceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of marker categories present (4 categories).
    fn marker_signal(text: &str) -> f64 {
        let hits = [
            &*QUANTITY_PATTERN,
            &*DATE_PATTERN,
            &*REFERENCE_PATTERN,
            &*QUOTE_PATTERN,
        ]
        .iter()
        .filter(|pattern| pattern.is_match(text))
        .count();

        hits as f64 / 4.0
    }

    fn length_signal(&self, text: &str) -> f64 {
        if self.length_floor_words == 0 {
            return 1.0;
        }
        let words = text.split_whitespace().count();
        (words as f64 / self.length_floor_words as f64).min(1.0)
    }

    /// Fraction of rubric criteria the rationale mentions by name.
    fn coverage_signal(text: &str, rubric: &Rubric) -> f64 {
        let lowered = text.to_lowercase();
        let total = rubric.criteria().len();
        if total == 0 {
            return 0.0;
        }

        let covered = rubric
            .names()
            .filter(|name| {
                let name = name.to_lowercase();
                lowered.contains(&name) || lowered.contains(&name.replace('_', " "))
            })
            .count();

        covered as f64 / total as f64
    }
}

impl EvidenceScorer for HeuristicEvidenceScorer {
    fn score(&self, rationale_text: &str, rubric: &Rubric) -> f64 {
        let text = rationale_text.trim();
        if text.is_empty() {
            return 0.0;
        }

        let weight_sum = self.marker_weight + self.length_weight + self.coverage_weight;
        if weight_sum <= 0.0 {
            return 0.0;
        }

        let raw = self.marker_weight * Self::marker_signal(text)
            + self.length_weight * self.length_signal(text)
            + self.coverage_weight * Self::coverage_signal(text, rubric);

        (raw / weight_sum).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THIN: &str = "Looks fine overall.";

    const DETAILED: &str = "Risk coverage: the plan closes finding 3 and control AC-2 by \
        rotating credentials on 40 servers within 30 days. Feasibility: owners are named \
        and the milestone is 2025-03-31. Compliance alignment: it cites ISO 27001 section 9.2 \
        directly, quoting \"access reviews must occur quarterly\". Clarity: each step has a \
        measurable exit criterion and a named approver, so progress can be tracked weekly.";

    #[test]
    fn test_empty_rationale_scores_zero() {
        let scorer = HeuristicEvidenceScorer::default();
        assert_eq!(scorer.score("   ", &Rubric::default()), 0.0);
    }

    #[test]
    fn test_detailed_beats_thin() {
        let scorer = HeuristicEvidenceScorer::default();
        let rubric = Rubric::default();
        let thin = scorer.score(THIN, &rubric);
        let detailed = scorer.score(DETAILED, &rubric);

        assert!(detailed > thin);
        assert!(detailed > 0.9, "detailed rationale scored {}", detailed);
        assert!(thin < 0.1, "thin rationale scored {}", thin);
    }

    #[test]
    fn test_markers_detected() {
        assert_eq!(HeuristicEvidenceScorer::marker_signal(DETAILED), 1.0);
        assert_eq!(HeuristicEvidenceScorer::marker_signal(THIN), 0.0);
    }

    #[test]
    fn test_coverage_matches_spaced_names() {
        let rubric = Rubric::default();
        let coverage =
            HeuristicEvidenceScorer::coverage_signal("Feasibility is weak; clarity is ok", &rubric);
        assert_eq!(coverage, 0.5);
    }

    #[test]
    fn test_score_is_bounded_and_stable() {
        let scorer = HeuristicEvidenceScorer::default();
        let rubric = Rubric::default();
        let first = scorer.score(DETAILED, &rubric);
        let second = scorer.score(DETAILED, &rubric);
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first));
    }
}
