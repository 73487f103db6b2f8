/// Model Client: the single point of entry for all generative model calls.
///
/// ARCHITECTURAL RULE: No other module may call the model API directly.
/// Everything goes through [`GenerativeModel`], which the dispatcher, the job
/// tracker and pattern extraction hold as `Arc<dyn GenerativeModel>`.
///
/// Each method performs exactly ONE HTTP attempt. Retry, backoff and
/// per-attempt timeouts belong to `generation::dispatcher`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::generation::MediaKind;
use crate::models::pattern::ExtractedPatternData;

/// Transport-level ceiling; the dispatcher enforces its own, shorter, per-attempt timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(180);

/// Substrings in a 400/422 body that mark a content-policy rejection.
const POLICY_MARKERS: &[&str] = &["policy", "safety", "moderation", "content_filter", "nsfw"];

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model returned empty content")]
    EmptyContent,
}

/// How the dispatcher should treat a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Auth,
    PolicyViolation,
    Malformed,
    Unknown,
}

impl ModelError {
    pub fn class(&self) -> FailureClass {
        match self {
            ModelError::Timeout => FailureClass::Transient,
            ModelError::Http(e) => match e.status() {
                Some(status) => classify_status(status.as_u16(), ""),
                None if e.is_decode() => FailureClass::Unknown,
                // connect / timeout / body errors without a status are network transients
                None => FailureClass::Transient,
            },
            ModelError::Api { status, message } => classify_status(*status, message),
            ModelError::Parse(_) | ModelError::EmptyContent => FailureClass::Unknown,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

/// Maps a model API status code (plus error body) onto a failure class.
pub fn classify_status(status: u16, message: &str) -> FailureClass {
    match status {
        408 | 429 | 500..=599 => FailureClass::Transient,
        401 | 403 => FailureClass::Auth,
        400 | 422 => {
            let lower = message.to_lowercase();
            if POLICY_MARKERS.iter().any(|m| lower.contains(m)) {
                FailureClass::PolicyViolation
            } else {
                FailureClass::Malformed
            }
        }
        404 | 413 | 415 => FailureClass::Malformed,
        _ => FailureClass::Unknown,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / response models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    #[default]
    Standard,
    High,
    Ultra,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub prompt: String,
    pub media_type: MediaKind,
    pub aspect_ratio: String,
    pub resolution: ResolutionTier,
    pub reference_images: Vec<String>,
}

/// What the model returned. Images and text are synchronous; video comes back as a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelOutput {
    Image { url: String },
    Text { text: String },
    Job { job_id: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderJobState {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderJobStatus {
    pub status: ProviderJobState,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Structured result of a pattern extraction call. Fields are NOT yet sanitized.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternExtraction {
    pub pattern: ExtractedPatternData,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    system: &'a str,
    prompt: &'a str,
    images: Vec<&'a str>,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Submits one generation. Video requests answer with [`ModelOutput::Job`].
    async fn generate(&self, request: &ModelRequest) -> Result<ModelOutput, ModelError>;

    /// Reads the provider-side status of a long-running job.
    async fn job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus, ModelError>;

    /// Describes the structure of a reference ad image.
    async fn extract_pattern(
        &self,
        image_url: &str,
        system: &str,
        prompt: &str,
    ) -> Result<PatternExtraction, ModelError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpModelClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(base_url: String, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerativeModel for HttpModelClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelOutput, ModelError> {
        let response = self
            .client
            .post(format!("{}/v1/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let output: ModelOutput = read_json(response).await?;
        debug!(media_type = request.media_type.as_str(), "Model generation accepted");
        Ok(output)
    }

    async fn job_status(&self, provider_job_id: &str) -> Result<ProviderJobStatus, ModelError> {
        let response = self
            .client
            .get(format!("{}/v1/jobs/{}", self.base_url, provider_job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        read_json(response).await
    }

    async fn extract_pattern(
        &self,
        image_url: &str,
        system: &str,
        prompt: &str,
    ) -> Result<PatternExtraction, ModelError> {
        let body = CompletionRequest {
            system,
            prompt,
            images: vec![image_url],
            response_format: "json",
        };

        let response = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let completion: CompletionResponse = read_json(response).await?;
        let text = completion.text.ok_or(ModelError::EmptyContent)?;
        serde_json::from_str(strip_json_fences(&text)).map_err(ModelError::Parse)
    }
}

/// Turns a non-2xx response into [`ModelError::Api`], otherwise decodes the body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ModelError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(ModelError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json::<T>().await?)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
