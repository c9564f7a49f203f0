//! # Report Analyzer
//!
//! Turns raw report text into a structured [`report_protocol::AnalysisResult`]
//! through one of three chat-model providers, or a deterministic stub for
//! offline runs. Providers share a single prompt and a tolerant output
//! parser so that the rest of the pipeline never sees provider differences.

pub mod error;
pub mod parse;
pub mod prompt;
pub mod provider;
pub mod remote;
pub mod stub;

pub use error::{AnalyzerError, Result};
pub use parse::parse_analysis_output;
pub use provider::{
    create_provider, AnalysisMode, AnalysisProvider, Provider, ProviderSettings,
    ANALYSIS_MODE_ENV,
};
pub use remote::{AnthropicAnalyzer, OllamaAnalyzer, OpenAiAnalyzer};
pub use stub::{StubAnalyzer, STUB_FAIL_MARKER};
