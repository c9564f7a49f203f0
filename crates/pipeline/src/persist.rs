//! Per-document artifacts under `data_dir/records`.
//!
//! Every processed document leaves two artifacts: a pretty JSON record for
//! people and downstream tools, and a bincode cache of the same record as
//! the fast reload path. Both are published atomically.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use report_protocol::ProcessingRecord;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Stable artifact stems for one run.
///
/// A document's artifact stem is its file stem; when several documents in
/// the scan set share one, the colliding documents get a short hash of
/// their relative path appended so artifacts never overwrite each other.
#[derive(Debug, Default)]
pub struct NamingPlan {
    stems: HashMap<String, String>,
}

impl NamingPlan {
    pub fn new<S: AsRef<str>>(relatives: &[S]) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for relative in relatives {
            *counts.entry(file_stem(relative.as_ref())).or_default() += 1;
        }
        let mut stems = HashMap::new();
        for relative in relatives {
            let relative = relative.as_ref();
            let stem = file_stem(relative);
            let unique = if counts[&stem] > 1 {
                format!("{stem}-{}", short_hash(relative))
            } else {
                stem
            };
            stems.insert(relative.to_string(), unique);
        }
        Self { stems }
    }

    pub fn stem_for(&self, relative: &str) -> String {
        self.stems
            .get(relative)
            .cloned()
            .unwrap_or_else(|| file_stem(relative))
    }
}

fn file_stem(relative: &str) -> String {
    Path::new(relative)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document")
        .to_string()
}

fn short_hash(relative: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative.as_bytes());
    let digest = hasher.finalize();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

/// Reads and writes record artifacts.
pub struct RecordStore {
    records_dir: PathBuf,
}

impl RecordStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            records_dir: data_dir.join("records"),
        }
    }

    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.records_dir)?;
        Ok(())
    }

    /// Writes the JSON record and its bincode cache, each via tmp + rename.
    pub fn persist(&self, stem: &str, record: &ProcessingRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.record_path(stem), json.as_bytes())?;
        let cache = bincode::serialize(record)?;
        write_atomic(&self.cache_path(stem), &cache)?;
        log::debug!("Persisted record {stem}");
        Ok(())
    }

    pub fn load_record(&self, stem: &str) -> Result<ProcessingRecord> {
        let raw = fs::read_to_string(self.record_path(stem))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn load_cache(&self, stem: &str) -> Result<ProcessingRecord> {
        let bytes = fs::read(self.cache_path(stem))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    #[must_use]
    pub fn record_path(&self, stem: &str) -> PathBuf {
        self.records_dir.join(format!("{stem}.json"))
    }

    #[must_use]
    pub fn cache_path(&self, stem: &str) -> PathBuf {
        self.records_dir.join(format!("{stem}.bin"))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
