//! Embeddings from an external model server
//!
//! The embedder POSTs `{model, prompt}` and reads `{embedding: [f32]}` back,
//! the request shape served by Ollama's `/api/embeddings`. Failures never
//! abort a caller: a chunk or query without an embedding is stored or
//! searched as absent.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Score given to pairs that cannot be compared
pub const INVALID_SIMILARITY: f32 = -1.0;

/// Turns text into a vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`; `None` when the model could not produce a vector
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedder backed by an HTTP endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = match self.client.post(&self.url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "embedding request failed");
                return None;
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %self.url, %status, body = %body, "embedding endpoint returned an error");
            return None;
        }

        match response.json::<EmbeddingResponse>().await {
            Ok(parsed) => Some(parsed.embedding),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "unreadable embedding response");
                None
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity between a query and a stored vector
///
/// Exactly [`INVALID_SIMILARITY`] when either side is empty, has zero norm,
/// or the score is not finite. Vectors of different non-zero lengths cannot
/// come from the same model and are an error.
pub fn cosine_similarity(query: &[f32], stored: &[f32]) -> Result<f32> {
    if query.is_empty() || stored.is_empty() {
        return Ok(INVALID_SIMILARITY);
    }
    if query.len() != stored.len() {
        return Err(Error::DimensionMismatch {
            expected: stored.len(),
            found: query.len(),
        });
    }

    let dot: f32 = query.iter().zip(stored.iter()).map(|(x, y)| x * y).sum();
    let norm_q: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_s: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_q > 0.0 && norm_s > 0.0 {
        let score = dot / (norm_q * norm_s);
        if score.is_finite() {
            return Ok(score);
        }
    }
    Ok(INVALID_SIMILARITY)
}
