//! Text embedding backends for project matching.
//!
//! The HTTP backend talks to an Ollama embeddings endpoint. The stub backend
//! derives a deterministic unit vector from a content hash, which keeps tests
//! and air-gapped runs offline while preserving cosine geometry.

use std::env;
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{ProjectIndexError, Result};

/// Environment variable selecting the embedding backend (`http` or `stub`).
pub const EMBEDDING_MODE_ENV: &str = "REPORT_PIPELINE_EMBEDDING_MODE";

/// Dimension of stub vectors.
pub const STUB_DIMENSION: usize = 256;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    Http,
    Stub,
}

impl EmbeddingMode {
    pub fn from_env() -> Result<Self> {
        let raw = env::var(EMBEDDING_MODE_ENV)
            .unwrap_or_else(|_| "http".to_string())
            .to_ascii_lowercase();
        match raw.as_str() {
            "http" => Ok(Self::Http),
            "stub" => Ok(Self::Stub),
            other => Err(ProjectIndexError::Embedding(format!(
                "Unsupported {EMBEDDING_MODE_ENV} '{other}' (expected 'http' or 'stub')"
            ))),
        }
    }
}

/// Embedding client used for both project descriptors and report excerpts.
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

enum EmbeddingBackend {
    Http {
        client: reqwest::Client,
        base_url: String,
        model: String,
    },
    Stub,
}

impl EmbeddingClient {
    /// Builds the backend selected by the environment.
    pub fn from_env(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        match EmbeddingMode::from_env()? {
            EmbeddingMode::Stub => Ok(Self::stub()),
            EmbeddingMode::Http => Self::http(base_url, model, timeout_secs),
        }
    }

    pub fn http(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            backend: EmbeddingBackend::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                model: model.to_string(),
            },
        })
    }

    #[must_use]
    pub const fn stub() -> Self {
        Self {
            backend: EmbeddingBackend::Stub,
        }
    }

    /// Stable backend identifier stored alongside project vectors. Vectors
    /// embedded under a different signature are rebuilt, never mixed.
    #[must_use]
    pub fn signature(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Http { model, .. } => format!("ollama:{model}"),
            EmbeddingBackend::Stub => format!("stub:{STUB_DIMENSION}"),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.backend {
            EmbeddingBackend::Stub => Ok(stub_embed(text, STUB_DIMENSION)),
            EmbeddingBackend::Http {
                client,
                base_url,
                model,
            } => embed_http(client, base_url, model, text).await,
        }
    }
}

async fn embed_http(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    text: &str,
) -> Result<Vec<f32>> {
    let url = format!("{base_url}/api/embeddings");
    let payload = json!({"model": model, "prompt": text});

    let mut attempt = 0;
    loop {
        attempt += 1;
        match request_embedding(client, &url, &payload).await {
            Ok(vector) => return Ok(vector),
            Err(err) if attempt < MAX_ATTEMPTS && err.is_retryable() => {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                log::warn!(
                    "Embedding attempt {attempt}/{MAX_ATTEMPTS} failed, retrying in {delay:?}: {err}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn request_embedding(
    client: &reqwest::Client,
    url: &str,
    payload: &Value,
) -> Result<Vec<f32>> {
    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProjectIndexError::EmbeddingService {
            status: status.as_u16(),
            detail: response.text().await.unwrap_or_default(),
        });
    }
    let body: Value = response.json().await?;
    let vector: Vec<f32> = body
        .pointer("/embedding")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect()
        })
        .unwrap_or_default();
    if vector.is_empty() {
        return Err(ProjectIndexError::Embedding(
            "embedding response carried no vector".to_string(),
        ));
    }
    Ok(vector)
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

pub(crate) fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

// report-analyzer's stub carries a deliberate copy of this hash.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_embed_is_deterministic() {
        let a = stub_embed("Shinagawa tower foundation work", STUB_DIMENSION);
        let b = stub_embed("Shinagawa tower foundation work", STUB_DIMENSION);
        assert_eq!(a, b);
        assert_eq!(a.len(), STUB_DIMENSION);
    }

    #[test]
    fn stub_embed_produces_unit_vectors() {
        let v = stub_embed("riverbank retaining wall", STUB_DIMENSION);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn different_texts_produce_different_vectors() {
        let a = stub_embed("station concourse", STUB_DIMENSION);
        let b = stub_embed("airport terminal", STUB_DIMENSION);
        assert!(cosine_similarity(&a, &b) < 0.99);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let c = vec![1.0, 0.0];
        let d = vec![0.0, 1.0];
        assert!(cosine_similarity(&c, &d).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn stub_signature_names_backend_and_dimension() {
        assert_eq!(EmbeddingClient::stub().signature(), "stub:256");
    }

    #[test]
    fn http_signature_names_the_model() {
        let client = EmbeddingClient::http("http://localhost:11434/", "mxbai-embed-large", 30)
            .unwrap();
        assert_eq!(client.signature(), "ollama:mxbai-embed-large");
    }
}
