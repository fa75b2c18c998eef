//! Judge prompt template.
//!
//! The rubric section is rendered from the plan's own rubric, so a custom
//! rubric changes both the criteria the judge sees and the JSON keys it
//! must return.

use std::fmt::Write;

use arbiter_core::{Plan, MAX_SCORE, MIN_SCORE};

/// Fixed preamble shared by every judge.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"
You are an independent compliance reviewer scoring a remediation plan.

A remediation plan responds to audit findings. Score how well the plan
addresses those findings against each criterion of the rubric below.
Score only what the plan text supports. Do not reward intentions that the
plan does not make concrete.

## Scoring Guidelines
- 9-10: Complete and specific: owners, dates, controls and measurable targets
- 7-8: Solid with minor gaps
- 4-6: Partially addresses the findings; important detail missing
- 1-3: Superficial or largely off-target
- 0: Does not address the criterion at all

Cite concrete evidence from the plan in your justifications: section
numbers, dates, percentages, named controls, quoted commitments.
"#;

/// Render the full prompt for one plan.
pub fn render_judge_prompt(plan: &Plan) -> String {
    let mut prompt = String::with_capacity(
        JUDGE_SYSTEM_PROMPT.len() + plan.plan_text.len() + plan.audit_context_text.len() + 1024,
    );
    prompt.push_str(JUDGE_SYSTEM_PROMPT);

    prompt.push_str("\n## Rubric\n");
    for criterion in plan.rubric.criteria() {
        // Writing to a String cannot fail
        let _ = writeln!(
            prompt,
            "- {} (weight {:.2}): {}",
            criterion.name, criterion.weight, criterion.description
        );
    }

    prompt.push_str("\n## Audit Findings\n");
    if plan.audit_context_text.trim().is_empty() {
        prompt.push_str("(none provided)\n");
    } else {
        prompt.push_str(plan.audit_context_text.trim());
        prompt.push('\n');
    }

    let _ = write!(prompt, "\n## Remediation Plan ({})\n", plan.plan_id);
    prompt.push_str(plan.plan_text.trim());
    prompt.push('\n');

    let _ = write!(
        prompt,
        "\n## Output Format (JSON only)\nScore every criterion from {} to {}.\n{{\n  \"scores\": {{\n",
        MIN_SCORE, MAX_SCORE
    );
    let names: Vec<&str> = plan.rubric.names().collect();
    for (i, name) in names.iter().enumerate() {
        let comma = if i + 1 < names.len() { "," } else { "" };
        let _ = writeln!(
            prompt,
            "    \"{}\": {{\"score\": <number>, \"justification\": \"...\"}}{}",
            name, comma
        );
    }
    prompt.push_str("  },\n  \"rationale\": \"overall assessment citing evidence\"\n}\n");

    prompt
}
