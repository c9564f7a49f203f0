//! Deterministic offline analyzer.
//!
//! Used by the test suite and by air-gapped smoke runs. Classification is
//! derived from visible document features (keywords, `phase:` lines, project
//! identifiers) plus a stable content hash, so repeated runs over the same
//! file always produce the same record.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use report_protocol::{AnalysisResult, Category, ReportType, RiskLevel, StatusFlag};

use crate::error::{AnalyzerError, Result};
use crate::provider::AnalysisProvider;

/// Documents containing this marker make the stub fail, which lets tests
/// drive the analyzer-unreachable path without a network.
pub const STUB_FAIL_MARKER: &str = "<<analyzer-fail>>";

static PROJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{2,4}-\d{4}-\d{3}").expect("valid regex"));
static PROJECT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^project:\s*([A-Za-z0-9-]+)").expect("valid regex"));
static PHASE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^phase:\s*(.+)$").expect("valid regex"));

#[derive(Default)]
pub struct StubAnalyzer {
    calls: AtomicUsize,
}

impl StubAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of classify calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for StubAnalyzer {
    async fn classify(&self, text: &str, filename: &str) -> Result<AnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains(STUB_FAIL_MARKER) {
            return Err(AnalyzerError::Provider {
                status: 599,
                detail: "stub failure marker present".to_string(),
            });
        }

        let lower = text.to_ascii_lowercase();
        let lower_name = filename.to_ascii_lowercase();
        let report_type = detect_report_type(&lower, &lower_name);
        let status = detect_status(&lower);
        let risk_level = detect_risk(report_type, status);
        let hash = fnv1a_64(text.as_bytes());

        Ok(AnalysisResult {
            report_type,
            status,
            category: detect_category(&lower),
            risk_level,
            requires_review: false,
            confidence: 0.6 + (hash % 40) as f32 / 100.0,
            candidate_ids: extract_project_ids(text, filename),
            phase: extract_phase(text),
            summary: first_line_summary(text),
            key_points: bullet_points(text),
            urgency_score: match risk_level {
                RiskLevel::High => 8,
                RiskLevel::Medium => 5,
                RiskLevel::Low => 2,
            },
            validation_issues: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn detect_report_type(lower: &str, lower_name: &str) -> ReportType {
    let mentions = |needle: &str| lower.contains(needle) || lower_name.contains(needle);
    if mentions("trouble") || mentions("incident") || mentions("accident") {
        ReportType::TroubleReport
    } else if mentions("estimate") || mentions("quotation") {
        ReportType::ConstructionEstimate
    } else if mentions("negotiation") {
        ReportType::NegotiationProgress
    } else if mentions("structural") || mentions("drawing") {
        ReportType::StructuralDesign
    } else if mentions("progress") {
        ReportType::ProgressUpdate
    } else if mentions("construction") || mentions("daily") || mentions("work report") {
        ReportType::ConstructionReport
    } else {
        ReportType::Other
    }
}

fn detect_status(lower: &str) -> StatusFlag {
    if lower.contains("stopped") || lower.contains("halted") {
        StatusFlag::Stopped
    } else if lower.contains("major delay") {
        StatusFlag::MajorDelay
    } else if lower.contains("delay") {
        StatusFlag::MinorDelay
    } else {
        StatusFlag::Normal
    }
}

fn detect_risk(report_type: ReportType, status: StatusFlag) -> RiskLevel {
    match (report_type, status) {
        (ReportType::TroubleReport, _) | (_, StatusFlag::Stopped) => RiskLevel::High,
        (_, StatusFlag::MajorDelay) | (_, StatusFlag::MinorDelay) => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

fn detect_category(lower: &str) -> Category {
    if lower.contains("permit") || lower.contains("approval") {
        Category::Administrative
    } else if lower.contains("budget") || lower.contains("cost") {
        Category::Financial
    } else if lower.contains("resident") || lower.contains("neighbor") {
        Category::Stakeholder
    } else {
        Category::Technical
    }
}

fn extract_project_ids(text: &str, filename: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |id: String| {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(&id)) {
            out.push(id);
        }
    };
    for haystack in [text, filename] {
        for found in PROJECT_ID.find_iter(haystack) {
            push(found.as_str().to_string());
        }
    }
    for caps in PROJECT_MARKER.captures_iter(text) {
        if let Some(id) = caps.get(1) {
            push(id.as_str().to_string());
        }
    }
    out
}

fn extract_phase(text: &str) -> Option<String> {
    PHASE_LINE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_line_summary(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let mut end = line.len().min(120);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line[..end].to_string()
}

fn bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|l| l.strip_prefix("- "))
        .take(5)
        .map(str::to_string)
        .collect()
}

// Deliberate copy of the FNV-1a in report-project-index's embedding stub;
// the two crates do not depend on each other.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
