//! Run configuration loaded from TOML plus `REPORT_PIPELINE_*` overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use report_analyzer::{Provider, ProviderSettings};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Top-level pipeline configuration.
///
/// Every field has a default so the pipeline runs with no config file at
/// all; environment variables override both defaults and file values.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Overrides the default `<data_dir>/project_master.json`.
    #[serde(default)]
    pub master_path: Option<PathBuf>,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 0 = derive from available parallelism.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorConfig {
    /// Minimum cosine similarity for an automatic vector assignment.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Characters of document text fed to the embedder; 0 = whole document.
    #[serde(default = "default_embed_excerpt_chars")]
    pub embed_excerpt_chars: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            top_k: default_top_k(),
            embed_excerpt_chars: default_embed_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            embed_model: default_embed_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_provider() -> String {
    "ollama".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_threshold() -> f32 {
    0.6
}
fn default_top_k() -> usize {
    5
}
fn default_embed_excerpt_chars() -> usize {
    2000
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "llama3.3".to_string()
}
fn default_embed_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            data_dir: default_data_dir(),
            master_path: None,
            provider: default_provider(),
            workers: 0,
            timeout_secs: default_timeout_secs(),
            vector: VectorConfig::default(),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from `path` (defaults when `None`), applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(file) => {
                let raw = fs::read_to_string(file).map_err(|err| {
                    PipelineError::Config(format!("failed to read {}: {err}", file.display()))
                })?;
                toml::from_str(&raw).map_err(|err| {
                    PipelineError::Config(format!("failed to parse {}: {err}", file.display()))
                })?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_path("REPORT_PIPELINE_DOCS_DIR") {
            self.docs_dir = dir;
        }
        if let Some(dir) = env_path("REPORT_PIPELINE_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Some(path) = env_path("REPORT_PIPELINE_MASTER_PATH") {
            self.master_path = Some(path);
        }
        if let Some(provider) = env_string("REPORT_PIPELINE_PROVIDER") {
            self.provider = provider;
        }
        if let Some(workers) = env_parse("REPORT_PIPELINE_WORKERS") {
            self.workers = workers;
        }
        if let Some(secs) = env_parse("REPORT_PIPELINE_TIMEOUT_SECS") {
            self.timeout_secs = secs;
        }
        if let Some(threshold) = env_parse("REPORT_PIPELINE_THRESHOLD") {
            self.vector.threshold = threshold;
        }
        if let Some(top_k) = env_parse("REPORT_PIPELINE_TOP_K") {
            self.vector.top_k = top_k;
        }
        if let Some(chars) = env_parse("REPORT_PIPELINE_EMBED_EXCERPT_CHARS") {
            self.vector.embed_excerpt_chars = chars;
        }
        if let Some(url) = env_string("REPORT_PIPELINE_OLLAMA_URL") {
            self.ollama.base_url = url;
        }
        if let Some(model) = env_string("REPORT_PIPELINE_OLLAMA_MODEL") {
            self.ollama.model = model;
        }
        if let Some(model) = env_string("REPORT_PIPELINE_EMBED_MODEL") {
            self.ollama.embed_model = model;
        }
        if let Some(model) = env_string("REPORT_PIPELINE_OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(model) = env_string("REPORT_PIPELINE_ANTHROPIC_MODEL") {
            self.anthropic.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if Provider::parse(&self.provider).is_none() {
            return Err(PipelineError::Config(format!(
                "unknown provider '{}', expected ollama, openai or anthropic",
                self.provider
            )));
        }
        if !(0.0..=1.0).contains(&self.vector.threshold) {
            return Err(PipelineError::Config(format!(
                "vector.threshold must be in [0.0, 1.0], got {}",
                self.vector.threshold
            )));
        }
        if self.vector.top_k == 0 {
            return Err(PipelineError::Config(
                "vector.top_k must be >= 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::Config(
                "timeout_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Project master location, `<data_dir>/project_master.json` unless set.
    #[must_use]
    pub fn master_path(&self) -> PathBuf {
        self.master_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("project_master.json"))
    }

    #[must_use]
    pub fn run_index_path(&self) -> PathBuf {
        self.data_dir.join("run_index.json")
    }

    #[must_use]
    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("project_vectors.json")
    }

    #[must_use]
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Connection settings for the analysis providers.
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            ollama_base_url: self.ollama.base_url.clone(),
            ollama_model: self.ollama.model.clone(),
            openai_model: self.openai.model.clone(),
            anthropic_model: self.anthropic.model.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}
