//! HTTP-backed analysis providers.
//!
//! All three speak simple chat-completion dialects and reuse the shared
//! prompt and output parser, so their only differences are endpoint shape,
//! authentication and response field paths.

use std::time::Duration;

use async_trait::async_trait;
use report_protocol::AnalysisResult;
use serde_json::{json, Value};

use crate::error::{AnalyzerError, Result};
use crate::parse::parse_analysis_output;
use crate::prompt::build_classification_prompt;
use crate::provider::{require_api_key, AnalysisProvider, ProviderSettings};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error bodies are logged and stored in processing records; keep them short.
const MAX_ERROR_BODY_CHARS: usize = 300;

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(AnalyzerError::Provider {
        status: status.as_u16(),
        detail: truncate_detail(&detail),
    })
}

fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY_CHARS;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

fn missing_content() -> AnalyzerError {
    AnalyzerError::MalformedOutput("response missing message content".into())
}

/// Local Ollama chat endpoint.
pub struct OllamaAnalyzer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaAnalyzer {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            base_url: settings.ollama_base_url.trim_end_matches('/').to_string(),
            model: settings.ollama_model.clone(),
        })
    }
}

#[async_trait]
impl AnalysisProvider for OllamaAnalyzer {
    async fn classify(&self, text: &str, filename: &str) -> Result<AnalysisResult> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_classification_prompt(text, filename)}],
            "stream": false,
            "format": "json",
            "options": {"temperature": 0.1}
        });
        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(&payload).send().await?;
        let body: Value = error_for_status(response).await?.json().await?;
        let content = body
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(missing_content)?;
        parse_analysis_output(content)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// OpenAI chat completions.
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            api_key: require_api_key("OPENAI_API_KEY")?,
            model: settings.openai_model.clone(),
        })
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiAnalyzer {
    async fn classify(&self, text: &str, filename: &str) -> Result<AnalysisResult> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_classification_prompt(text, filename)}],
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        });
        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = error_for_status(response).await?.json().await?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(missing_content)?;
        parse_analysis_output(content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Anthropic messages API.
pub struct AnthropicAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicAnalyzer {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.timeout_secs)?,
            api_key: require_api_key("ANTHROPIC_API_KEY")?,
            model: settings.anthropic_model.clone(),
        })
    }
}

#[async_trait]
impl AnalysisProvider for AnthropicAnalyzer {
    async fn classify(&self, text: &str, filename: &str) -> Result<AnalysisResult> {
        let payload = json!({
            "model": self.model,
            "max_tokens": 2048,
            "temperature": 0.1,
            "messages": [{"role": "user", "content": build_classification_prompt(text, filename)}]
        });
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;
        let body: Value = error_for_status(response).await?.json().await?;
        let content = body
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .ok_or_else(missing_content)?;
        parse_analysis_output(content)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
