//! Tolerant parsing of model output into an [`AnalysisResult`].
//!
//! Chat models wrap JSON in prose more often than not, so the parser first
//! carves out the outermost JSON object, then normalizes every field.
//! Unknown vocabulary values are coerced to a documented fallback and the
//! coercion is recorded in `validation_issues` instead of failing the run.

use report_protocol::{AnalysisResult, Category, ReportType, RiskLevel, StatusFlag};
use serde_json::Value;

use crate::error::{AnalyzerError, Result};

/// Parses raw model output into a normalized [`AnalysisResult`].
///
/// Fails only when no JSON object is present or one of the three required
/// fields (`report_type`, `status_flag`, `risk_level`) is missing entirely.
pub fn parse_analysis_output(raw: &str) -> Result<AnalysisResult> {
    let block = extract_json_object(raw)
        .ok_or_else(|| AnalyzerError::MalformedOutput("no JSON object in output".into()))?;
    let value: Value = serde_json::from_str(block)
        .map_err(|e| AnalyzerError::MalformedOutput(format!("invalid JSON: {e}")))?;

    let mut issues = Vec::new();

    let report_type = required_label(
        &value,
        "report_type",
        ReportType::parse_label,
        ReportType::Other,
        &mut issues,
    )?;
    let status = required_label(
        &value,
        "status_flag",
        StatusFlag::parse_label,
        StatusFlag::Normal,
        &mut issues,
    )?;
    let risk_level = required_label(
        &value,
        "risk_level",
        RiskLevel::parse_label,
        RiskLevel::Medium,
        &mut issues,
    )?;

    let category = match value.get("category").and_then(Value::as_str) {
        Some(s) => Category::parse_label(s).unwrap_or_else(|| {
            issues.push(format!("unknown category '{}'", s.trim()));
            Category::Other
        }),
        None => Category::Other,
    };

    let confidence = value
        .get("analysis_confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;

    let urgency_score = value
        .get("urgency_score")
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .clamp(1, 10) as u8;

    let phase = value
        .get("current_phase")
        .or_else(|| value.get("current_construction_phase"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let key_points = string_array(&value, "key_points");
    let candidate_ids = candidate_ids(&value);

    let explicit_review = value
        .get("requires_human_review")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // Coerced vocabulary means the model drifted from the contract, which a
    // human should see regardless of what the model claimed.
    let requires_review = explicit_review || !issues.is_empty();

    Ok(AnalysisResult {
        report_type,
        status,
        category,
        risk_level,
        requires_review,
        confidence,
        candidate_ids,
        phase,
        summary,
        key_points,
        urgency_score,
        validation_issues: issues,
    })
}

/// Reads a required vocabulary field. Missing field is a hard error;
/// an unknown value falls back and records a validation issue.
fn required_label<T>(
    value: &Value,
    field: &str,
    parse: impl Fn(&str) -> Option<T>,
    fallback: T,
    issues: &mut Vec<String>,
) -> Result<T> {
    let raw = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AnalyzerError::MalformedOutput(format!("missing field '{field}'")))?;
    Ok(parse(raw).unwrap_or_else(|| {
        issues.push(format!("unknown {field} '{}'", raw.trim()));
        fallback
    }))
}

fn string_array(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Collects project identifiers from `candidate_project_ids`, plus the
/// legacy single `project_info.project_id` shape some models emit.
fn candidate_ids(value: &Value) -> Vec<String> {
    let mut raw = string_array(value, "candidate_project_ids");
    if let Some(id) = value
        .get("project_info")
        .and_then(|info| info.get("project_id"))
        .and_then(Value::as_str)
    {
        raw.push(id.trim().to_string());
    }

    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for id in raw {
        if id.is_empty() || PLACEHOLDER_IDS.contains(&id.to_ascii_lowercase().as_str()) {
            continue;
        }
        let key = id.to_ascii_uppercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(id);
    }
    out
}

const PLACEHOLDER_IDS: &[&str] = &["unknown", "none", "n/a"];

/// Returns the first balanced `{...}` block in `raw`, skipping brace
/// characters inside JSON strings.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn complete_output() -> String {
        r#"{
            "report_type": "CONSTRUCTION_REPORT",
            "status_flag": "minor_delay",
            "category": "technical",
            "risk_level": "medium",
            "requires_human_review": false,
            "analysis_confidence": 0.82,
            "candidate_project_ids": ["TKY-2024-001", "tky-2024-001", "OSA-2023-045"],
            "current_phase": "foundation work",
            "summary": "Concrete pour delayed by rain.",
            "key_points": ["pour delayed", "crane idle"],
            "urgency_score": 4
        }"#
        .to_string()
    }

    #[test]
    fn parses_complete_output() {
        let result = parse_analysis_output(&complete_output()).unwrap();
        assert_eq!(result.report_type, ReportType::ConstructionReport);
        assert_eq!(result.status, StatusFlag::MinorDelay);
        assert_eq!(result.category, Category::Technical);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.confidence, 0.82);
        assert_eq!(result.urgency_score, 4);
        assert_eq!(result.phase.as_deref(), Some("foundation work"));
        assert!(!result.requires_review);
        assert!(result.validation_issues.is_empty());
    }

    #[test]
    fn duplicate_ids_are_dropped_case_insensitively() {
        let result = parse_analysis_output(&complete_output()).unwrap();
        assert_eq!(result.candidate_ids, vec!["TKY-2024-001", "OSA-2023-045"]);
    }

    #[test]
    fn json_is_extracted_from_chatty_output() {
        let raw = format!(
            "Sure, here is the analysis you asked for:\n```json\n{}\n```\nLet me know!",
            complete_output()
        );
        let result = parse_analysis_output(&raw).unwrap();
        assert_eq!(result.report_type, ReportType::ConstructionReport);
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let raw = r#"{"report_type": "OTHER", "status_flag": "normal", "risk_level": "low", "summary": "use {braces} carefully"}"#;
        let result = parse_analysis_output(raw).unwrap();
        assert_eq!(result.summary, "use {braces} carefully");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let raw = r#"{"report_type": "OTHER", "status_flag": "normal"}"#;
        let err = parse_analysis_output(raw).unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedOutput(_)));
        assert!(err.to_string().contains("risk_level"));
    }

    #[test]
    fn no_json_at_all_is_an_error() {
        let err = parse_analysis_output("I could not analyze this document.").unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedOutput(_)));
    }

    #[test]
    fn unknown_vocabulary_coerces_and_flags_review() {
        let raw = r#"{
            "report_type": "WEEKLY_DIGEST",
            "status_flag": "paused",
            "category": "weather",
            "risk_level": "severe",
            "requires_human_review": false
        }"#;
        let result = parse_analysis_output(raw).unwrap();
        assert_eq!(result.report_type, ReportType::Other);
        assert_eq!(result.status, StatusFlag::Normal);
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.validation_issues.len(), 4);
        assert!(result.requires_review);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let raw = r#"{"report_type": "OTHER", "status_flag": "normal", "risk_level": "low"}"#;
        let result = parse_analysis_output(raw).unwrap();
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.urgency_score, 1);
        assert_eq!(result.phase, None);
        assert!(result.candidate_ids.is_empty());
        assert!(result.key_points.is_empty());
        assert!(!result.requires_review);
    }

    #[test]
    fn out_of_range_numbers_are_clamped() {
        let raw = r#"{
            "report_type": "OTHER",
            "status_flag": "normal",
            "risk_level": "low",
            "analysis_confidence": 3.5,
            "urgency_score": 42
        }"#;
        let result = parse_analysis_output(raw).unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.urgency_score, 10);
    }

    #[test]
    fn legacy_project_info_shape_is_accepted() {
        let raw = r#"{
            "report_type": "OTHER",
            "status_flag": "normal",
            "risk_level": "low",
            "project_info": {"project_id": "NGY-2024-112"}
        }"#;
        let result = parse_analysis_output(raw).unwrap();
        assert_eq!(result.candidate_ids, vec!["NGY-2024-112"]);
    }

    #[test]
    fn placeholder_ids_are_filtered() {
        let raw = r#"{
            "report_type": "OTHER",
            "status_flag": "normal",
            "risk_level": "low",
            "candidate_project_ids": ["unknown", "N/A", "", "TKY-2024-001"]
        }"#;
        let result = parse_analysis_output(raw).unwrap();
        assert_eq!(result.candidate_ids, vec!["TKY-2024-001"]);
    }
}
