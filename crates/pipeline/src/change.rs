//! Decides which scanned documents a run must actually process.

use std::fs;
use std::path::{Path, PathBuf};

use report_protocol::RunIndex;
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};

/// Per-run behavior switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reprocess every selected document regardless of index state.
    pub force: bool,
    /// Restrict the run to a single document.
    pub only_file: Option<PathBuf>,
}

/// One scanned document with the facts partitioning established. The hash
/// is computed here, once, and reused by the workers; a file mutated
/// between hash and load simply gets reprocessed next run.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub path: PathBuf,
    /// Index key: path relative to the documents root, `/`-separated.
    pub relative: String,
    pub hash: String,
}

/// Scan set split against the run index.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub to_process: Vec<PendingDocument>,
    pub to_skip: Vec<PendingDocument>,
}

/// Applies the skip rule to every selected file: process iff forced, never
/// seen, content changed, or the last attempt did not succeed.
pub fn partition(
    root: &Path,
    files: &[PathBuf],
    index: &RunIndex,
    options: &RunOptions,
) -> Result<ChangeSet> {
    let selected = select(root, files, options)?;
    let mut change_set = ChangeSet::default();
    for path in selected {
        let relative = relative_key(root, &path);
        let hash = match hash_file(&path) {
            Ok(hash) => hash,
            Err(err) => {
                // Unreadable now; the worker records the load failure.
                log::warn!("Could not hash {}: {err}", path.display());
                String::new()
            }
        };
        let pending = PendingDocument {
            path,
            relative,
            hash,
        };
        if !options.force && index.is_current(&pending.relative, &pending.hash) {
            change_set.to_skip.push(pending);
        } else {
            change_set.to_process.push(pending);
        }
    }
    log::info!(
        "{} documents to process, {} unchanged",
        change_set.to_process.len(),
        change_set.to_skip.len()
    );
    Ok(change_set)
}

/// Resolves `--file` to a single document: a direct path match wins; a
/// bare file name falls back to searching every subdirectory and must
/// match exactly one document. No match, or a bare name shared by several
/// documents, is an error.
fn select(root: &Path, files: &[PathBuf], options: &RunOptions) -> Result<Vec<PathBuf>> {
    let Some(requested) = options.only_file.as_ref() else {
        return Ok(files.to_vec());
    };
    if let Some(path) = files
        .iter()
        .find(|path| matches_directly(root, path, requested))
    {
        return Ok(vec![path.clone()]);
    }
    let by_name: Vec<PathBuf> = if has_no_directory(requested) {
        files
            .iter()
            .filter(|path| path.file_name() == requested.file_name())
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    match by_name.len() {
        0 => Err(PipelineError::FileOutsideScan {
            path: requested.clone(),
        }),
        1 => Ok(by_name),
        _ => Err(PipelineError::FileAmbiguous {
            path: requested.clone(),
            matches: by_name.iter().map(|path| relative_key(root, path)).collect(),
        }),
    }
}

/// Direct match: exact path, root-relative path, or canonical path.
fn matches_directly(root: &Path, candidate: &Path, requested: &Path) -> bool {
    if candidate == requested {
        return true;
    }
    if candidate.strip_prefix(root).is_ok_and(|rel| rel == requested) {
        return true;
    }
    if let (Ok(a), Ok(b)) = (candidate.canonicalize(), requested.canonicalize()) {
        if a == b {
            return true;
        }
    }
    false
}

fn has_no_directory(requested: &Path) -> bool {
    requested
        .parent()
        .is_some_and(|parent| parent.as_os_str().is_empty())
}

/// Index key for a document: root-relative path with forward slashes.
pub fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

pub fn hash_file(path: &Path) -> std::io::Result<String> {
    Ok(hash_bytes(&fs::read(path)?))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use report_protocol::ProcessingStatus;

    fn write(root: &Path, name: &str, body: &str) -> PathBuf {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, body).expect("write");
        path
    }

    #[test]
    fn new_document_is_processed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "daily.txt", "content");

        let change_set = partition(
            dir.path(),
            &[file],
            &RunIndex::new(),
            &RunOptions::default(),
        )
        .expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
        assert!(change_set.to_skip.is_empty());
        assert_eq!(change_set.to_process[0].relative, "daily.txt");
    }

    #[test]
    fn unchanged_success_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "daily.txt", "content");
        let hash = hash_file(&file).expect("hash");

        let mut index = RunIndex::new();
        index.apply("daily.txt", ProcessingStatus::Success, &hash, Utc::now());

        let change_set =
            partition(dir.path(), &[file], &index, &RunOptions::default()).expect("partition");
        assert!(change_set.to_process.is_empty());
        assert_eq!(change_set.to_skip.len(), 1);
        assert_eq!(change_set.to_skip[0].hash, hash);
    }

    #[test]
    fn changed_content_is_reprocessed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "daily.txt", "v2");

        let mut index = RunIndex::new();
        index.apply("daily.txt", ProcessingStatus::Success, "old-hash", Utc::now());

        let change_set =
            partition(dir.path(), &[file], &index, &RunOptions::default()).expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
    }

    #[test]
    fn failed_entry_is_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "daily.txt", "content");
        let hash = hash_file(&file).expect("hash");

        let mut index = RunIndex::new();
        index.apply("daily.txt", ProcessingStatus::Failed, &hash, Utc::now());

        let change_set =
            partition(dir.path(), &[file], &index, &RunOptions::default()).expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
    }

    #[test]
    fn force_reprocesses_unchanged_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "daily.txt", "content");
        let hash = hash_file(&file).expect("hash");

        let mut index = RunIndex::new();
        index.apply("daily.txt", ProcessingStatus::Success, &hash, Utc::now());

        let options = RunOptions {
            force: true,
            only_file: None,
        };
        let change_set = partition(dir.path(), &[file], &index, &options).expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
        assert!(change_set.to_skip.is_empty());
    }

    #[test]
    fn single_file_mode_restricts_the_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kept = write(dir.path(), "site_a/daily.txt", "a");
        let other = write(dir.path(), "site_b/daily2.txt", "b");

        let options = RunOptions {
            force: false,
            only_file: Some(PathBuf::from("site_a/daily.txt")),
        };
        let change_set = partition(
            dir.path(),
            &[kept.clone(), other],
            &RunIndex::new(),
            &options,
        )
        .expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
        assert_eq!(change_set.to_process[0].path, kept);
    }

    #[test]
    fn bare_file_name_matches_in_subdirectory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "site_a/daily.txt", "a");

        let options = RunOptions {
            force: false,
            only_file: Some(PathBuf::from("daily.txt")),
        };
        let change_set =
            partition(dir.path(), &[file], &RunIndex::new(), &options).expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
    }

    #[test]
    fn direct_match_beats_bare_name_fanout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let at_root = write(dir.path(), "daily.txt", "a");
        let nested = write(dir.path(), "site_b/daily.txt", "b");

        let options = RunOptions {
            force: false,
            only_file: Some(PathBuf::from("daily.txt")),
        };
        let change_set = partition(
            dir.path(),
            &[at_root.clone(), nested],
            &RunIndex::new(),
            &options,
        )
        .expect("partition");
        assert_eq!(change_set.to_process.len(), 1);
        assert_eq!(change_set.to_process[0].path, at_root);
    }

    #[test]
    fn ambiguous_bare_name_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = write(dir.path(), "site_a/daily.txt", "a");
        let b = write(dir.path(), "site_b/daily.txt", "b");

        let options = RunOptions {
            force: false,
            only_file: Some(PathBuf::from("daily.txt")),
        };
        let err = partition(dir.path(), &[a, b], &RunIndex::new(), &options).unwrap_err();
        assert!(matches!(err, PipelineError::FileAmbiguous { .. }));
    }

    #[test]
    fn unknown_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write(dir.path(), "daily.txt", "a");

        let options = RunOptions {
            force: false,
            only_file: Some(PathBuf::from("ghost.txt")),
        };
        let err = partition(dir.path(), &[file], &RunIndex::new(), &options).unwrap_err();
        assert!(matches!(err, PipelineError::FileOutsideScan { .. }));
    }

    #[test]
    fn relative_keys_use_forward_slashes() {
        let root = Path::new("/data/docs");
        let nested = Path::new("/data/docs/site_a/daily.txt");
        assert_eq!(relative_key(root, nested), "site_a/daily.txt");
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        assert_eq!(hash_bytes(b"alpha"), hash_bytes(b"alpha"));
        assert_ne!(hash_bytes(b"alpha"), hash_bytes(b"alphb"));
        assert_eq!(hash_bytes(b"alpha").len(), 64);
    }
}
