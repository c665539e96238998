//! Text generation through an external model server
//!
//! POSTs `{model, prompt, stream: false}` and reads `{response}`, as served by
//! Ollama's `/api/generate`. Available models are read from an OpenAI-style
//! listing (`/v1/models`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reply used when the server answers 200 without a `response` field
pub const NO_RESPONSE: &str = "No response received.";

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Non-200 answer; the display form is what the user sees
    #[error("Error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Error: no models URL configured")]
    NoModelsUrl,
}

/// Produces a reply for a fully assembled prompt
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Models available for generation, without `hidden`
    async fn list_models(&self, hidden: &str) -> Result<Vec<String>, GenerationError> {
        Ok(visible_models([self.model_name().to_string()], hidden))
    }

    fn model_name(&self) -> &str;
}

/// Drop `hidden` from a list of model ids
///
/// `nomic-embed-text` also hides `nomic-embed-text:latest` and vice versa.
pub fn visible_models(ids: impl IntoIterator<Item = String>, hidden: &str) -> Vec<String> {
    let hidden = untagged(hidden);
    ids.into_iter().filter(|id| untagged(id) != hidden).collect()
}

fn untagged(id: &str) -> &str {
    id.strip_suffix(":latest").unwrap_or(id)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    models_url: Option<String>,
}

impl HttpGenerator {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            models_url: None,
        })
    }

    pub fn with_models_url(mut self, models_url: Option<String>) -> Self {
        self.models_url = models_url;
        self
    }
}

/// Pass a 200 through; anything else becomes `GenerationError::Status`
async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    let status = response.status();
    if status == reqwest::StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%url, %status, "generation endpoint returned an error");
    Err(GenerationError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let response = check_status(&self.url, response).await?;

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response.unwrap_or_else(|| NO_RESPONSE.to_string()))
    }

    async fn list_models(&self, hidden: &str) -> Result<Vec<String>, GenerationError> {
        let url = self.models_url.as_deref().ok_or(GenerationError::NoModelsUrl)?;
        let response = self.client.get(url).send().await?;
        let response = check_status(url, response).await?;

        let parsed: ModelList = response.json().await?;
        Ok(visible_models(parsed.data.into_iter().map(|m| m.id), hidden))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
