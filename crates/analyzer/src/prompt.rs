//! Prompt construction for the classification call.
//!
//! All providers share a single consolidated prompt so that switching
//! providers never changes the expected output contract.

/// Documents longer than this are truncated before prompting. Keeps the
/// request within typical context windows without a tokenizer dependency.
const MAX_PROMPT_TEXT_CHARS: usize = 12_000;

const OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{
  "report_type": one of CONSTRUCTION_REPORT | TROUBLE_REPORT | PROGRESS_UPDATE | CONSTRUCTION_ESTIMATE | NEGOTIATION_PROGRESS | STRUCTURAL_DESIGN | OTHER,
  "status_flag": one of normal | minor_delay | major_delay | stopped,
  "category": one of technical | administrative | stakeholder | financial | environmental | legal | other,
  "risk_level": one of low | medium | high,
  "requires_human_review": boolean,
  "analysis_confidence": number between 0.0 and 1.0,
  "candidate_project_ids": array of project identifier strings found in the document,
  "current_phase": string describing the work phase, or "",
  "summary": two or three sentence summary,
  "key_points": array of short strings,
  "urgency_score": integer from 1 (routine) to 10 (critical)
}"#;

/// Builds the consolidated classification prompt for one document.
pub fn build_classification_prompt(text: &str, filename: &str) -> String {
    let body = truncated(text);
    format!(
        "You are a field-report analyst. Classify the report below and extract \
         the structured facts requested.\n\n\
         Rules:\n\
         - Use only the listed vocabulary values, copied verbatim.\n\
         - List every project identifier mentioned in the document or filename.\n\
         - If delays, accidents or stoppages are described, reflect them in \
         status_flag and risk_level rather than the summary alone.\n\
         - Set requires_human_review to true when the document is ambiguous or \
         contains contradictory information.\n\n\
         {OUTPUT_CONTRACT}\n\n\
         Filename: {filename}\n\
         Document:\n{body}"
    )
}

fn truncated(text: &str) -> &str {
    if text.len() <= MAX_PROMPT_TEXT_CHARS {
        return text;
    }
    let mut end = MAX_PROMPT_TEXT_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
