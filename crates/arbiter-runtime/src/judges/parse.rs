//! Extraction of a judgment from a model reply.
//!
//! Models wrap JSON in code fences or prose often enough that the reply is
//! searched for the outermost object rather than parsed whole.

use serde::Deserialize;
use std::collections::BTreeMap;

use arbiter_core::Rubric;

/// Scores and rationale pulled from a reply, before rubric validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawJudgment {
    pub scores: BTreeMap<String, f64>,
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
struct JudgmentEnvelope {
    scores: BTreeMap<String, ScoreEntry>,
    #[serde(default, alias = "reasoning")]
    rationale: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreEntry {
    Plain(f64),
    Detailed {
        score: f64,
        #[serde(default)]
        justification: String,
    },
}

/// The span from the first `{` to the last `}`.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parse a reply into scores and a rationale.
///
/// Per-criterion justifications are appended to the rationale in rubric
/// order so evidence scoring sees them.
pub fn parse_judgment(reply: &str, rubric: &Rubric) -> Result<RawJudgment, String> {
    let json =
        extract_json_object(reply).ok_or_else(|| "reply contains no JSON object".to_string())?;
    let envelope: JudgmentEnvelope =
        serde_json::from_str(json).map_err(|e| format!("invalid judgment JSON: {}", e))?;

    let mut scores = BTreeMap::new();
    let mut justifications = BTreeMap::new();
    for (name, entry) in envelope.scores {
        match entry {
            ScoreEntry::Plain(score) => {
                scores.insert(name, score);
            }
            ScoreEntry::Detailed {
                score,
                justification,
            } => {
                if !justification.trim().is_empty() {
                    justifications.insert(name.clone(), justification);
                }
                scores.insert(name, score);
            }
        }
    }

    let mut rationale = envelope.rationale.trim().to_string();
    for name in rubric.names() {
        if let Some(text) = justifications.get(name) {
            if !rationale.is_empty() {
                rationale.push('\n');
            }
            rationale.push_str(name);
            rationale.push_str(": ");
            rationale.push_str(text.trim());
        }
    }

    Ok(RawJudgment { scores, rationale })
}
