//! Discovers report documents under the documents root.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Extensions the pipeline recognizes. Plain-text families are decoded by
/// the loader; the binary ones are discovered here so they surface as
/// `failed (unsupported format)` records instead of vanishing silently.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx", "xlsx"];

/// Recursive scanner rooted at the documents directory.
pub struct DocumentScanner {
    root: PathBuf,
}

impl DocumentScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walks the root and returns every supported document, path-sorted so
    /// chunking and reports are deterministic across runs.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(false).into_iter();
        for entry in walker.filter_entry(|e| !is_hidden(e)) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        log::info!(
            "Found {} report documents under {}",
            files.len(),
            self.root.display()
        );
        files
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}
