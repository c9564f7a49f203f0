use report_protocol::{ProcessingRecord, ProcessingStatus};
use serde::{Deserialize, Serialize};

/// Statistics about one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Documents in the scan set
    pub total: usize,

    /// Documents analyzed and mapped this run
    pub success: usize,

    /// Documents skipped as unchanged
    pub skipped: usize,

    /// Documents that failed to load, analyze or persist
    pub failed: usize,

    /// Documents waiting for a human mapping decision
    pub needs_review: usize,

    /// Time taken in milliseconds
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            total: 0,
            success: 0,
            skipped: 0,
            failed: 0,
            needs_review: 0,
            elapsed_ms: 0,
        }
    }

    pub fn from_records(records: &[ProcessingRecord], elapsed_ms: u64) -> Self {
        let mut summary = Self::new();
        summary.elapsed_ms = elapsed_ms;
        for record in records {
            summary.add_record(record);
        }
        summary
    }

    pub fn add_record(&mut self, record: &ProcessingRecord) {
        self.total += 1;
        match record.status {
            ProcessingStatus::Success => self.success += 1,
            ProcessingStatus::Skipped => self.skipped += 1,
            ProcessingStatus::Failed => self.failed += 1,
        }
        if record.needs_review() {
            self.needs_review += 1;
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Excerpt embedding computed for one document during vector mapping,
/// forwarded so a vector-store consumer never needs a second provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEmbedding {
    /// Document path relative to the documents root.
    pub path: String,
    pub vector: Vec<f32>,
}

/// Everything one run produced: the summary plus every record, including
/// the in-memory `skipped` ones that were never persisted.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub records: Vec<ProcessingRecord>,
    /// One entry per document the run embedded (vector-mapping path only).
    pub embeddings: Vec<DocumentEmbedding>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use report_protocol::{Document, MappingResult};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn record(status: ProcessingStatus, mapping: Option<MappingResult>) -> ProcessingRecord {
        ProcessingRecord {
            document: Document {
                path: PathBuf::from("daily.txt"),
                content_hash: "h".to_string(),
                text: Arc::from(""),
                discovered_at: Utc::now(),
            },
            analysis: None,
            mapping,
            status,
            error_detail: None,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn counts_follow_record_statuses() {
        let records = vec![
            record(
                ProcessingStatus::Success,
                Some(MappingResult::direct("ASH-2024-001".to_string(), vec![])),
            ),
            record(
                ProcessingStatus::Success,
                Some(MappingResult::unmapped(vec![], vec![])),
            ),
            record(ProcessingStatus::Skipped, None),
            record(ProcessingStatus::Failed, None),
        ];

        let summary = RunSummary::from_records(&records, 42);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.needs_review, 1);
        assert_eq!(summary.elapsed_ms, 42);
    }

    #[test]
    fn empty_run_is_all_zeroes() {
        let summary = RunSummary::from_records(&[], 1);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.needs_review, 0);
    }
}
