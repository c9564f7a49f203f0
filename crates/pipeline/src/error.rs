use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache encoding error: {0}")]
    Cache(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run index at {} is corrupt: {detail}", path.display())]
    IndexCorrupt { path: PathBuf, detail: String },

    #[error("Failed to flush run index to {}: {detail}", path.display())]
    IndexFlush { path: PathBuf, detail: String },

    #[error("Requested file {} is not part of the document set", path.display())]
    FileOutsideScan { path: PathBuf },

    #[error("Requested file {} matches more than one document: {}", path.display(), matches.join(", "))]
    FileAmbiguous { path: PathBuf, matches: Vec<String> },

    #[error(transparent)]
    Analyzer(#[from] report_analyzer::AnalyzerError),

    #[error(transparent)]
    ProjectIndex(#[from] report_project_index::ProjectIndexError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
