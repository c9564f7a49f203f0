use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {detail}")]
    Provider { status: u16, detail: String },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
