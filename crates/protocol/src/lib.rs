//! # Report Protocol
//!
//! Shared domain types for the report ingestion pipeline: documents, analysis
//! and mapping results, per-run processing records, and the durable run index
//! that drives incremental skip decisions.
//!
//! All types serialize with serde; the run index additionally encodes the
//! update rules that keep failed documents eligible for retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Schema version written into every persisted run index.
pub const RUN_INDEX_VERSION: &str = "1";

/// Document classification produced by the consolidated analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    ConstructionReport,
    TroubleReport,
    ProgressUpdate,
    ConstructionEstimate,
    NegotiationProgress,
    StructuralDesign,
    Other,
}

impl ReportType {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::ConstructionReport => "CONSTRUCTION_REPORT",
            Self::TroubleReport => "TROUBLE_REPORT",
            Self::ProgressUpdate => "PROGRESS_UPDATE",
            Self::ConstructionEstimate => "CONSTRUCTION_ESTIMATE",
            Self::NegotiationProgress => "NEGOTIATION_PROGRESS",
            Self::StructuralDesign => "STRUCTURAL_DESIGN",
            Self::Other => "OTHER",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "CONSTRUCTION_REPORT" => Some(Self::ConstructionReport),
            "TROUBLE_REPORT" => Some(Self::TroubleReport),
            "PROGRESS_UPDATE" => Some(Self::ProgressUpdate),
            "CONSTRUCTION_ESTIMATE" => Some(Self::ConstructionEstimate),
            "NEGOTIATION_PROGRESS" => Some(Self::NegotiationProgress),
            "STRUCTURAL_DESIGN" => Some(Self::StructuralDesign),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Objective schedule state reported for the document's project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFlag {
    Normal,
    MinorDelay,
    MajorDelay,
    Stopped,
}

impl StatusFlag {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::MinorDelay => "minor_delay",
            Self::MajorDelay => "major_delay",
            Self::Stopped => "stopped",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "minor_delay" => Some(Self::MinorDelay),
            "major_delay" => Some(Self::MajorDelay),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// Dominant cause category for the reported situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technical,
    Administrative,
    Stakeholder,
    Financial,
    Environmental,
    Legal,
    Other,
}

impl Category {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Administrative => "administrative",
            Self::Stakeholder => "stakeholder",
            Self::Financial => "financial",
            Self::Environmental => "environmental",
            Self::Legal => "legal",
            Self::Other => "other",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "technical" => Some(Self::Technical),
            "administrative" => Some(Self::Administrative),
            "stakeholder" => Some(Self::Stakeholder),
            "financial" => Some(Self::Financial),
            "environmental" => Some(Self::Environmental),
            "legal" => Some(Self::Legal),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Strategy that produced a project assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    Direct,
    Vector,
    None,
}

impl MappingMethod {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Vector => "vector",
            Self::None => "none",
        }
    }
}

/// Terminal outcome of one document in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
    Skipped,
    Failed,
}

impl ProcessingStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// A discovered report file with its loaded text.
///
/// Identity is `path` (relative to the documents root). `text` is shared
/// across pipeline stages without copying and serializes inline, so the
/// persisted record carries the full raw content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub content_hash: String,
    pub text: Arc<str>,
    pub discovered_at: DateTime<Utc>,
}

fn default_urgency() -> u8 {
    1
}

/// Full classification bundle from a single analysis call.
///
/// Immutable once produced. `validation_issues` records every value the
/// provider returned outside the documented vocabularies (each one was
/// coerced to its fallback), so degraded provider output is visible in the
/// persisted record instead of silently normalized away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub report_type: ReportType,
    pub status: StatusFlag,
    pub category: Category,
    pub risk_level: RiskLevel,
    /// Provider self-declared the document hard to classify.
    #[serde(default)]
    pub requires_review: bool,
    /// Provider self-reported confidence, clamped to [0, 1].
    pub confidence: f32,
    /// Identifier candidates ranked most-likely first; may be empty.
    #[serde(default)]
    pub candidate_ids: Vec<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Forward-looking urgency on a 1..=10 scale.
    #[serde(default = "default_urgency")]
    pub urgency_score: u8,
    #[serde(default)]
    pub validation_issues: Vec<String>,
}

/// One scored neighbor from the project master index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCandidate {
    pub project_id: String,
    pub score: f32,
}

/// Final (or pending) project assignment for a document.
///
/// Construct through [`MappingResult::direct`], [`MappingResult::vector`] or
/// [`MappingResult::unmapped`] so that `method = none` always carries
/// `confidence = 0` and `needs_review = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub project_id: Option<String>,
    pub confidence: f32,
    pub method: MappingMethod,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub needs_review: bool,
    #[serde(default)]
    pub alternatives: Vec<ProjectCandidate>,
}

impl MappingResult {
    /// Exact identifier match. Confidence is fixed at 1.0.
    pub fn direct(project_id: String, evidence: Vec<String>) -> Self {
        Self {
            project_id: Some(project_id),
            confidence: 1.0,
            method: MappingMethod::Direct,
            evidence,
            needs_review: false,
            alternatives: Vec::new(),
        }
    }

    /// Similarity match at or above the acceptance threshold.
    pub fn vector(
        project_id: String,
        score: f32,
        evidence: Vec<String>,
        alternatives: Vec<ProjectCandidate>,
    ) -> Self {
        Self {
            project_id: Some(project_id),
            confidence: score.clamp(0.0, 1.0),
            method: MappingMethod::Vector,
            evidence,
            needs_review: false,
            alternatives,
        }
    }

    /// No acceptable assignment; queued for human review.
    pub fn unmapped(evidence: Vec<String>, alternatives: Vec<ProjectCandidate>) -> Self {
        Self {
            project_id: None,
            confidence: 0.0,
            method: MappingMethod::None,
            evidence,
            needs_review: true,
            alternatives,
        }
    }
}

/// Everything the pipeline produced for one document in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub document: Document,
    pub analysis: Option<AnalysisResult>,
    pub mapping: Option<MappingResult>,
    pub status: ProcessingStatus,
    #[serde(default)]
    pub error_detail: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingRecord {
    pub fn needs_review(&self) -> bool {
        self.mapping.as_ref().is_some_and(|m| m.needs_review)
    }
}

/// Last known processing state for one document path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub last_hash: String,
    pub last_status: ProcessingStatus,
    pub last_processed_at: DateTime<Utc>,
}

/// Durable per-path processing state, the single source of truth for skip
/// decisions across runs.
///
/// Entries are keyed by the document path relative to the documents root.
/// `BTreeMap` keeps serialization order stable so two runs that end in the
/// same state produce byte-identical index files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunIndex {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub entries: BTreeMap<String, IndexEntry>,
}

impl RunIndex {
    pub fn new() -> Self {
        Self {
            version: RUN_INDEX_VERSION.to_string(),
            last_updated: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    pub fn entry(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// True when the document can be skipped: a prior run succeeded on
    /// exactly this content. Any recorded failure is stale by definition so
    /// the document gets retried.
    pub fn is_current(&self, path: &str, hash: &str) -> bool {
        self.entries.get(path).is_some_and(|entry| {
            entry.last_status == ProcessingStatus::Success && entry.last_hash == hash
        })
    }

    /// Apply one document outcome.
    ///
    /// Skipped outcomes never mutate the index. A failure never overwrites a
    /// prior success entry (the file must stay retry-eligible with its last
    /// good state intact); without a prior success the failed attempt is
    /// recorded so it shows up in the index history.
    pub fn apply(
        &mut self,
        path: &str,
        status: ProcessingStatus,
        hash: &str,
        processed_at: DateTime<Utc>,
    ) {
        match status {
            ProcessingStatus::Skipped => {}
            ProcessingStatus::Success => {
                self.entries.insert(
                    path.to_string(),
                    IndexEntry {
                        last_hash: hash.to_string(),
                        last_status: ProcessingStatus::Success,
                        last_processed_at: processed_at,
                    },
                );
            }
            ProcessingStatus::Failed => {
                let prior_success = self
                    .entries
                    .get(path)
                    .is_some_and(|e| e.last_status == ProcessingStatus::Success);
                if !prior_success {
                    self.entries.insert(
                        path.to_string(),
                        IndexEntry {
                            last_hash: hash.to_string(),
                            last_status: ProcessingStatus::Failed,
                            last_processed_at: processed_at,
                        },
                    );
                }
            }
        }
    }
}

impl Default for RunIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ts() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn enum_labels_round_trip() {
        for report_type in [
            ReportType::ConstructionReport,
            ReportType::TroubleReport,
            ReportType::ProgressUpdate,
            ReportType::ConstructionEstimate,
            ReportType::NegotiationProgress,
            ReportType::StructuralDesign,
            ReportType::Other,
        ] {
            assert_eq!(
                ReportType::parse_label(report_type.as_label()),
                Some(report_type)
            );
        }
        for status in [
            StatusFlag::Normal,
            StatusFlag::MinorDelay,
            StatusFlag::MajorDelay,
            StatusFlag::Stopped,
        ] {
            assert_eq!(StatusFlag::parse_label(status.as_label()), Some(status));
        }
        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(RiskLevel::parse_label(risk.as_label()), Some(risk));
        }
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(
            ReportType::parse_label("construction_report"),
            Some(ReportType::ConstructionReport)
        );
        assert_eq!(
            StatusFlag::parse_label(" STOPPED "),
            Some(StatusFlag::Stopped)
        );
        assert_eq!(Category::parse_label("Technical"), Some(Category::Technical));
        assert_eq!(RiskLevel::parse_label("HIGH"), Some(RiskLevel::High));
        assert_eq!(StatusFlag::parse_label("unknown"), None);
    }

    #[test]
    fn serde_uses_documented_labels() {
        let json = serde_json::to_string(&ReportType::TroubleReport).unwrap();
        assert_eq!(json, "\"TROUBLE_REPORT\"");
        let json = serde_json::to_string(&StatusFlag::MajorDelay).unwrap();
        assert_eq!(json, "\"major_delay\"");
        let json = serde_json::to_string(&MappingMethod::None).unwrap();
        assert_eq!(json, "\"none\"");
        let parsed: ProcessingStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(parsed, ProcessingStatus::Skipped);
    }

    #[test]
    fn unmapped_result_keeps_invariant() {
        let result = MappingResult::unmapped(vec!["no candidates".into()], Vec::new());
        assert_eq!(result.method, MappingMethod::None);
        assert_eq!(result.confidence, 0.0);
        assert!(result.needs_review);
        assert_eq!(result.project_id, None);
    }

    #[test]
    fn direct_result_has_full_confidence() {
        let result = MappingResult::direct("TKY-2024-001".into(), vec!["TKY-2024-001".into()]);
        assert_eq!(result.method, MappingMethod::Direct);
        assert_eq!(result.confidence, 1.0);
        assert!(!result.needs_review);
    }

    #[test]
    fn success_updates_index_entry() {
        let mut index = RunIndex::new();
        index.apply("reports/a.txt", ProcessingStatus::Success, "h1", ts());
        assert!(index.is_current("reports/a.txt", "h1"));
        assert!(!index.is_current("reports/a.txt", "h2"));
        assert!(!index.is_current("reports/b.txt", "h1"));
    }

    #[test]
    fn failure_never_overwrites_prior_success() {
        let mut index = RunIndex::new();
        let first = ts();
        index.apply("reports/a.txt", ProcessingStatus::Success, "h1", first);
        index.apply("reports/a.txt", ProcessingStatus::Failed, "h2", ts());

        let entry = index.entry("reports/a.txt").unwrap();
        assert_eq!(entry.last_status, ProcessingStatus::Success);
        assert_eq!(entry.last_hash, "h1");
        assert_eq!(entry.last_processed_at, first);
    }

    #[test]
    fn failure_without_prior_success_is_recorded_but_stale() {
        let mut index = RunIndex::new();
        index.apply("reports/a.txt", ProcessingStatus::Failed, "h1", ts());

        let entry = index.entry("reports/a.txt").unwrap();
        assert_eq!(entry.last_status, ProcessingStatus::Failed);
        // Still not current, so the next run retries it.
        assert!(!index.is_current("reports/a.txt", "h1"));
    }

    #[test]
    fn skipped_outcome_never_mutates() {
        let mut index = RunIndex::new();
        index.apply("reports/a.txt", ProcessingStatus::Success, "h1", ts());
        let before = index.clone();
        index.apply("reports/a.txt", ProcessingStatus::Skipped, "h1", ts());
        assert_eq!(index.entries, before.entries);
    }

    #[test]
    fn record_serde_round_trip() {
        let record = ProcessingRecord {
            document: Document {
                path: PathBuf::from("reports/r1.txt"),
                content_hash: "abc".into(),
                text: Arc::from("monthly progress update"),
                discovered_at: ts(),
            },
            analysis: Some(AnalysisResult {
                report_type: ReportType::ProgressUpdate,
                status: StatusFlag::Normal,
                category: Category::Technical,
                risk_level: RiskLevel::Low,
                requires_review: false,
                confidence: 0.9,
                candidate_ids: vec!["TKY-2024-001".into()],
                phase: Some("construction".into()),
                summary: "on track".into(),
                key_points: vec!["no blockers".into()],
                urgency_score: 2,
                validation_issues: Vec::new(),
            }),
            mapping: Some(MappingResult::direct(
                "TKY-2024-001".into(),
                vec!["TKY-2024-001".into()],
            )),
            status: ProcessingStatus::Success,
            error_detail: None,
            processed_at: ts(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: ProcessingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(!back.needs_review());
    }
}
