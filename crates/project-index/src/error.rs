use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectIndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding service returned status {status}: {detail}")]
    EmbeddingService { status: u16, detail: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Project master not found at {}", path.display())]
    MasterNotFound { path: PathBuf },
}

impl ProjectIndexError {
    /// Transient failures worth another attempt; everything else fails fast.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::EmbeddingService { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectIndexError>;
