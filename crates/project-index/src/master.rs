//! Project master data and the derived vector index.
//!
//! The master file is the authoritative list of active projects. Descriptor
//! vectors are cached next to it and keyed by a fingerprint of the master
//! bytes plus the embedding backend signature, so edits to either trigger a
//! rebuild instead of serving stale geometry.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embeddings::{cosine_similarity, EmbeddingClient};
use crate::error::{ProjectIndexError, Result};

/// One project from the master file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRecord {
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub responsible: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub phase: String,
}

impl ProjectRecord {
    /// Labeled text embedded for similarity matching. Empty fields are
    /// omitted so sparse master entries do not dilute the vector.
    pub fn descriptor_text(&self) -> String {
        let mut parts = vec![format!("project {}", self.project_id)];
        for (label, value) in [
            ("name", &self.name),
            ("location", &self.location),
            ("owner", &self.responsible),
            ("phase", &self.phase),
            ("description", &self.description),
        ] {
            if !value.trim().is_empty() {
                parts.push(format!("{label}: {value}"));
            }
        }
        parts.join(" | ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectVector {
    pub project_id: String,
    pub vector: Vec<f32>,
}

/// On-disk cache of descriptor vectors.
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorsFile {
    pub fingerprint: String,
    pub embedder: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ProjectVector>,
}

/// A similarity hit against the project index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProject {
    pub project_id: String,
    pub score: f32,
}

/// In-memory view of the master file plus descriptor vectors.
#[derive(Debug)]
pub struct ProjectIndex {
    records: Vec<ProjectRecord>,
    by_id: HashMap<String, usize>,
    vectors: Vec<ProjectVector>,
}

impl ProjectIndex {
    /// Loads the master file and reuses cached vectors when the fingerprint
    /// and embedder signature both match; otherwise embeds every descriptor
    /// and rewrites the cache atomically.
    pub async fn load_or_build(
        master_path: &Path,
        vectors_path: &Path,
        embedder: &EmbeddingClient,
    ) -> Result<Self> {
        let raw = fs::read_to_string(master_path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ProjectIndexError::MasterNotFound {
                    path: master_path.to_path_buf(),
                }
            } else {
                ProjectIndexError::Io(err)
            }
        })?;
        let records: Vec<ProjectRecord> = serde_json::from_str(&raw)?;
        let fingerprint = sha256_hex(raw.as_bytes());
        let embedder_id = embedder.signature();

        let vectors = match read_vectors(vectors_path) {
            Some(file)
                if file.fingerprint == fingerprint
                    && file.embedder == embedder_id
                    && file.entries.len() == records.len() =>
            {
                log::debug!("Reusing {} cached project vectors", file.entries.len());
                file.entries
            }
            _ => build_vectors(&records, vectors_path, embedder, fingerprint.clone()).await?,
        };

        let mut by_id = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            let key = record.project_id.trim().to_ascii_uppercase();
            if by_id.insert(key, idx).is_some() {
                log::warn!(
                    "Duplicate project id '{}' in master data, keeping the later entry",
                    record.project_id
                );
            }
        }

        Ok(Self {
            records,
            by_id,
            vectors,
        })
    }

    /// Case-insensitive lookup by project id.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<&ProjectRecord> {
        self.by_id
            .get(&id.trim().to_ascii_uppercase())
            .and_then(|&idx| self.records.get(idx))
    }

    /// Brute-force cosine search over all descriptor vectors, best first.
    /// Equal scores fall back to ascending project id so results are stable.
    #[must_use]
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<ScoredProject> {
        let mut scored: Vec<ScoredProject> = self
            .vectors
            .iter()
            .map(|pv| ScoredProject {
                project_id: pv.project_id.clone(),
                score: cosine_similarity(query, &pv.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.project_id.cmp(&b.project_id))
        });
        scored.truncate(top_k);
        scored
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.records.iter()
    }
}

async fn build_vectors(
    records: &[ProjectRecord],
    vectors_path: &Path,
    embedder: &EmbeddingClient,
    fingerprint: String,
) -> Result<Vec<ProjectVector>> {
    log::info!("Embedding {} project descriptors", records.len());
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let vector = embedder.embed(&record.descriptor_text()).await?;
        entries.push(ProjectVector {
            project_id: record.project_id.clone(),
            vector,
        });
    }

    let file = VectorsFile {
        fingerprint,
        embedder: embedder.signature(),
        generated_at: Utc::now(),
        entries,
    };
    if let Some(parent) = vectors_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = vectors_path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
    fs::rename(&tmp, vectors_path)?;

    Ok(file.entries)
}

fn read_vectors(path: &Path) -> Option<VectorsFile> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(file) => Some(file),
        Err(err) => {
            log::warn!("Ignoring unreadable vectors file {}: {err}", path.display());
            None
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
