//! Decodes discovered documents into plain text.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported format '.{extension}'")]
    UnsupportedFormat { extension: String },
    #[error("document is empty")]
    Empty,
}

/// Decoded document content plus the file facts recorded on the document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Reads and decodes one document.
///
/// Only the plain-text families decode today; the binary formats the
/// scanner recognizes come back as `UnsupportedFormat` so they are recorded
/// as failed and retried once a decoder exists.
pub fn load(path: &Path) -> Result<LoadedDocument, LoaderError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "txt" | "md" => {}
        other => {
            return Err(LoaderError::UnsupportedFormat {
                extension: other.to_string(),
            })
        }
    }

    let bytes = fs::read(path)?;
    let modified_at = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.is_empty() {
        return Err(LoaderError::Empty);
    }
    Ok(LoadedDocument {
        text,
        size_bytes: bytes.len() as u64,
        modified_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn loads_utf8_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daily.txt");
        fs::write(&path, "Site A progress: 80%").expect("write");

        let loaded = load(&path).expect("load");
        assert_eq!(loaded.text, "Site A progress: 80%");
        assert_eq!(loaded.size_bytes, 20);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mixed.md");
        fs::write(&path, [b'o', b'k', 0xFF, b'!']).expect("write");

        let loaded = load(&path).expect("load");
        assert_eq!(loaded.text, "ok\u{FFFD}!");
    }

    #[test]
    fn binary_formats_are_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.pdf");
        fs::write(&path, "%PDF-1.7").expect("write");

        let err = load(&path).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::UnsupportedFormat { ref extension } if extension == "pdf"
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blank.txt");
        fs::write(&path, "").expect("write");

        assert!(matches!(load(&path).unwrap_err(), LoaderError::Empty));
    }

    #[test]
    fn missing_file_is_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("gone.txt")).unwrap_err();
        assert!(matches!(err, LoaderError::Io(_)));
    }
}
