//! Assigns analyzed documents to master projects.
//!
//! Two strategies, strictly ordered: a direct identifier match ends the
//! search with full confidence; only then is the document excerpt embedded
//! and matched by cosine similarity. An unmapped document is a review
//! queue item, never an error.

use std::sync::Arc;

use report_project_index::{EmbeddingClient, ProjectIndex, ScoredProject};
use report_protocol::{AnalysisResult, MappingResult, ProjectCandidate};

pub struct ProjectMapper {
    index: Arc<ProjectIndex>,
    embedder: Arc<EmbeddingClient>,
    threshold: f32,
    top_k: usize,
    excerpt_chars: usize,
}

impl ProjectMapper {
    pub fn new(
        index: Arc<ProjectIndex>,
        embedder: Arc<EmbeddingClient>,
        threshold: f32,
        top_k: usize,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            threshold,
            top_k,
            excerpt_chars,
        }
    }

    /// Maps one analyzed document. Also returns the excerpt embedding when
    /// one was computed, so downstream consumers get it without a second
    /// provider call; direct matches never embed.
    pub async fn map(
        &self,
        text: &str,
        analysis: &AnalysisResult,
    ) -> (MappingResult, Option<Vec<f32>>) {
        for raw in &analysis.candidate_ids {
            if let Some(record) = self.index.lookup(raw) {
                log::debug!("Direct match '{raw}' -> {}", record.project_id);
                return (
                    MappingResult::direct(
                        record.project_id.clone(),
                        vec![format!("identifier '{raw}' found in project master")],
                    ),
                    None,
                );
            }
        }

        if self.index.is_empty() {
            return (MappingResult::unmapped(Vec::new(), Vec::new()), None);
        }

        let excerpt = excerpt(text, self.excerpt_chars);
        let query = match self.embedder.embed(excerpt).await {
            Ok(query) => query,
            Err(err) => {
                log::warn!("Excerpt embedding failed: {err}");
                return (
                    MappingResult::unmapped(vec![format!("embedding failed: {err}")], Vec::new()),
                    None,
                );
            }
        };

        let hits = self.index.search(&query, self.top_k);
        let Some(top) = hits.first().cloned() else {
            return (MappingResult::unmapped(Vec::new(), Vec::new()), Some(query));
        };
        if top.score >= self.threshold {
            let evidence = vec![format!(
                "similarity {:.3} >= threshold {:.3}",
                top.score, self.threshold
            )];
            let mapping =
                MappingResult::vector(top.project_id, top.score, evidence, to_candidates(&hits[1..]));
            (mapping, Some(query))
        } else {
            let evidence = vec![format!(
                "best similarity {:.3} below threshold {:.3}",
                top.score, self.threshold
            )];
            (
                MappingResult::unmapped(evidence, to_candidates(&hits)),
                Some(query),
            )
        }
    }
}

fn to_candidates(hits: &[ScoredProject]) -> Vec<ProjectCandidate> {
    hits.iter()
        .map(|hit| ProjectCandidate {
            project_id: hit.project_id.clone(),
            score: hit.score,
        })
        .collect()
}

/// First `chars` characters on a char boundary; 0 means the whole text.
fn excerpt(text: &str, chars: usize) -> &str {
    if chars == 0 {
        return text;
    }
    match text.char_indices().nth(chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}
