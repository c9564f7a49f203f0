//! Run-index IO: tolerant load, exclusively-locked atomic flush.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

use fs2::FileExt;
use report_protocol::{RunIndex, RUN_INDEX_VERSION};

use crate::error::{PipelineError, Result};

/// Exclusive advisory lock on the sibling `.lock` file, held for the whole
/// flush and released on drop.
struct FlushLock {
    file: fs::File,
}

impl Drop for FlushLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Loads the run index. A missing file is a first run (empty index); an
/// unreadable or unparsable file is corruption and stops the run before any
/// document is touched.
pub fn load(path: &Path) -> Result<RunIndex> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RunIndex::new()),
        Err(err) => return Err(corrupt(path, err.to_string())),
    };
    let index: RunIndex =
        serde_json::from_str(&raw).map_err(|err| corrupt(path, err.to_string()))?;
    if index.version != RUN_INDEX_VERSION {
        return Err(corrupt(
            path,
            format!("unsupported version '{}'", index.version),
        ));
    }
    Ok(index)
}

/// Writes the index to `<path>.tmp` and renames it into place while holding
/// the flush lock. Any failure here is fatal to the run.
pub async fn flush(index: &RunIndex, path: &Path) -> Result<()> {
    let _lock = acquire_flush_lock(path).await?;
    let json =
        serde_json::to_string_pretty(index).map_err(|err| flush_error(path, err.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|err| flush_error(path, format!("write {}: {err}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|err| flush_error(path, format!("rename {}: {err}", tmp.display())))?;
    log::debug!("Flushed run index with {} entries", index.entries.len());
    Ok(())
}

async fn acquire_flush_lock(index_path: &Path) -> Result<FlushLock> {
    let index_path = index_path.to_path_buf();
    let lock_path = index_path.with_extension("lock");
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                flush_error(&index_path, format!("create {}: {err}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| {
                flush_error(&index_path, format!("open {}: {err}", lock_path.display()))
            })?;
        file.lock_exclusive().map_err(|err| {
            flush_error(&index_path, format!("lock {}: {err}", lock_path.display()))
        })?;
        Ok(FlushLock { file })
    })
    .await
    .map_err(|err| PipelineError::Other(format!("flush lock task failed: {err}")))?
}

fn corrupt(path: &Path, detail: String) -> PipelineError {
    PipelineError::IndexCorrupt {
        path: path.to_path_buf(),
        detail,
    }
}

fn flush_error(path: &Path, detail: String) -> PipelineError {
    PipelineError::IndexFlush {
        path: path.to_path_buf(),
        detail,
    }
}
