//! Provider trait and selection.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use report_protocol::AnalysisResult;

use crate::error::{AnalyzerError, Result};
use crate::remote::{AnthropicAnalyzer, OllamaAnalyzer, OpenAiAnalyzer};
use crate::stub::StubAnalyzer;

/// Environment variable selecting the analysis backend (`live` or `stub`).
pub const ANALYSIS_MODE_ENV: &str = "REPORT_PIPELINE_ANALYSIS_MODE";

/// A backend that turns one document into an [`AnalysisResult`].
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Classifies one document and extracts structured facts from it.
    async fn classify(&self, text: &str, filename: &str) -> Result<AnalysisResult>;

    /// Short provider name recorded in logs and processing records.
    fn name(&self) -> &str;
}

/// Remote analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Connection settings for the remote providers.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openai_model: String,
    pub anthropic_model: String,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.3".to_string(),
            openai_model: "gpt-4o".to_string(),
            anthropic_model: "claude-3-5-sonnet-20241022".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Analysis backend mode, overridable through the environment so test runs
/// stay offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Live,
    Stub,
}

impl AnalysisMode {
    pub fn from_env() -> Self {
        match env::var(ANALYSIS_MODE_ENV).ok().as_deref() {
            Some("stub") => Self::Stub,
            Some("live") | None => Self::Live,
            Some(other) => {
                log::warn!("Unknown {ANALYSIS_MODE_ENV} value '{other}', using live mode");
                Self::Live
            }
        }
    }
}

/// Builds the provider selected by `provider`, unless the environment forces
/// stub mode.
pub fn create_provider(
    provider: Provider,
    settings: &ProviderSettings,
) -> Result<Arc<dyn AnalysisProvider>> {
    if AnalysisMode::from_env() == AnalysisMode::Stub {
        log::info!("Analysis mode: stub (deterministic, offline)");
        return Ok(Arc::new(StubAnalyzer::new()));
    }
    let built: Arc<dyn AnalysisProvider> = match provider {
        Provider::Ollama => Arc::new(OllamaAnalyzer::new(settings)?),
        Provider::OpenAi => Arc::new(OpenAiAnalyzer::new(settings)?),
        Provider::Anthropic => Arc::new(AnthropicAnalyzer::new(settings)?),
    };
    log::info!("Analysis provider: {}", built.name());
    Ok(built)
}

/// Reads a required API key from the environment.
pub(crate) fn require_api_key(var: &str) -> Result<String> {
    env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AnalyzerError::Config(format!("{var} is not set")))
}
