//! Text embedding providers.
//!
//! The store only requires that an [`Embedder`] is deterministic for equal
//! input and that its vectors are comparable by cosine distance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::EmbeddingError;

/// Default dimension of the local hashing embedder (matches MiniLM).
pub const DEFAULT_DIMENSION: usize = 384;

/// Maps free text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors.
    ///
    /// Persisted with a collection so vectors from different models are never
    /// mixed.
    fn model_id(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// A zero vector is treated as orthogonal to everything (distance 1).
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    1.0 - cosine
}

// =============================================================================
// Local hashing embedder
// =============================================================================

/// Deterministic feature-hashing embedder that needs no model download.
///
/// Each lowercase word contributes one feature and each of its character
/// trigrams a half-weight feature, so inflections such as `crashlooping` and
/// `CrashLoopBackOff` land close together. Vectors are L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("local-hashing-{dimension}"),
        }
    }

    /// Vector size produced by this embedder.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) % self.dimension as u64) as usize
    }

    /// Embed synchronously; the async trait method delegates here.
    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            vector[self.bucket(&format!("w:{token}"))] += 1.0;

            let padded: Vec<char> = std::iter::once('^')
                .chain(token.chars())
                .chain(std::iter::once('$'))
                .collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket(&format!("g:{gram}"))] += 0.5;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }
}

/// 64-bit FNV-1a; stable across Rust releases, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    bytes.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

// =============================================================================
// Remote embedder (OpenAI-compatible /embeddings)
// =============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint
/// (OpenAI, Ollama, text-embeddings-inference).
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    /// Create a client for `{base_url}/embeddings`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Send a bearer token with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);

        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Rejected { status, body });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or(EmbeddingError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_text("pod crashlooping due to bad command");
        let b = embedder.embed_text("pod crashlooping due to bad command");

        assert_eq!(a.len(), DEFAULT_DIMENSION);
        assert_eq!(a, b);
    }

    #[test]
    fn test_vectors_are_normalised() {
        let v = HashingEmbedder::default().embed_text("ImagePullBackOff on node-3");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_text_is_closer_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let crash = embedder.embed_text("pod crashlooping due to bad command");
        let similar = embedder.embed_text("pod in CrashLoopBackOff");
        let unrelated = embedder.embed_text("certificate expired for ingress");

        assert!(cosine_distance(&crash, &similar) < cosine_distance(&crash, &unrelated));
    }

    #[test]
    fn test_cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let v = HashingEmbedder::new(8).embed_text("  --  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
