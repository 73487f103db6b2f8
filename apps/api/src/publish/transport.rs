//! HTTP transport to the social platform, behind a trait so the adapter's
//! protocol can be exercised without a network.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Put,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Binary { bytes: Bytes, content_type: String },
}

#[derive(Debug, Clone)]
pub struct PlatformRequest {
    pub method: HttpMethod,
    pub url: String,
    pub bearer_token: String,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub struct PlatformResponse {
    pub status: u16,
    pub body: String,
}

impl PlatformResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure; the request may not have reached the platform.
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() || e.is_body() {
            TransportError::Network(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
pub trait PlatformTransport: Send + Sync {
    async fn send(&self, request: PlatformRequest) -> Result<PlatformResponse, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }
}

#[async_trait]
impl PlatformTransport for ReqwestTransport {
    async fn send(&self, request: PlatformRequest) -> Result<PlatformResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
        }
        .bearer_auth(&request.bearer_token);

        let builder = match request.body {
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Binary {
                bytes,
                content_type,
            } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(PlatformResponse { status, body })
    }
}
