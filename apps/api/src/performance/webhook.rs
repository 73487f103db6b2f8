//! Performance webhook intake.
//!
//! Flow: verify `X-Adloop-Signature` over the raw body → parse and bound the
//! metrics → confirm the generation exists → append one snapshot.
//!
//! Any rejection leaves storage untouched. Duplicate deliveries are stored as
//! separate snapshots; weighting them is up to downstream analysis.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::store::GenerationStore;
use crate::models::platform::Platform;
use crate::performance::store::{NewPerformanceRecord, PerformanceStore};
use crate::signing::verify_hmac_hex;

pub const SIGNATURE_HEADER: &str = "x-adloop-signature";
const SIGNATURE_PREFIX: &str = "sha256=";

/// Upper bound for any count metric in a single snapshot.
const MAX_COUNT: f64 = 1e12;

#[derive(Debug, Error)]
pub enum WebhookValidationError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("signature does not match payload")]
    BadSignature,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("generation {0} does not exist")]
    UnknownGeneration(Uuid),
}

impl WebhookValidationError {
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            WebhookValidationError::MissingSignature | WebhookValidationError::BadSignature
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    #[serde(alias = "generation_id")]
    generation_id: String,
    platform: String,
    #[serde(default)]
    impressions: Option<f64>,
    #[serde(default, alias = "engagement_rate")]
    engagement_rate: Option<f64>,
    #[serde(default)]
    clicks: Option<f64>,
    #[serde(default)]
    conversions: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub received: bool,
    pub record_id: Uuid,
}

pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), WebhookValidationError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(WebhookValidationError::MissingSignature)?;
    let signature = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);
    if verify_hmac_hex(secret, body, signature) {
        Ok(())
    } else {
        Err(WebhookValidationError::BadSignature)
    }
}

/// Parses the body into a bounded snapshot. Missing metrics default to zero.
pub fn parse_payload(body: &[u8]) -> Result<NewPerformanceRecord, WebhookValidationError> {
    let payload: WebhookPayload =
        serde_json::from_slice(body).map_err(|e| WebhookValidationError::Malformed(e.to_string()))?;

    let generation_id = Uuid::parse_str(payload.generation_id.trim()).map_err(|_| {
        WebhookValidationError::InvalidField {
            field: "generationId",
            reason: "not a UUID".to_string(),
        }
    })?;
    let platform = Platform::parse(&payload.platform).ok_or_else(|| {
        WebhookValidationError::InvalidField {
            field: "platform",
            reason: format!("unsupported platform '{}'", payload.platform),
        }
    })?;

    let engagement_rate = payload.engagement_rate.unwrap_or(0.0);
    if !engagement_rate.is_finite() || !(0.0..=100.0).contains(&engagement_rate) {
        return Err(WebhookValidationError::InvalidField {
            field: "engagementRate",
            reason: "must be between 0 and 100".to_string(),
        });
    }

    Ok(NewPerformanceRecord {
        generation_id,
        platform: platform.as_str().to_string(),
        impressions: count("impressions", payload.impressions)?,
        engagement_rate,
        clicks: count("clicks", payload.clicks)?,
        conversions: count("conversions", payload.conversions)?,
    })
}

fn count(field: &'static str, value: Option<f64>) -> Result<i64, WebhookValidationError> {
    let value = value.unwrap_or(0.0);
    if !value.is_finite() || value < 0.0 || value > MAX_COUNT {
        return Err(WebhookValidationError::InvalidField {
            field,
            reason: format!("must be between 0 and {MAX_COUNT:e}"),
        });
    }
    if value.fract() != 0.0 {
        return Err(WebhookValidationError::InvalidField {
            field,
            reason: "must be a whole number".to_string(),
        });
    }
    Ok(value as i64)
}

pub struct PerformanceIngestor {
    secret: String,
    generations: Arc<dyn GenerationStore>,
    store: Arc<dyn PerformanceStore>,
}

impl PerformanceIngestor {
    pub fn new(
        secret: String,
        generations: Arc<dyn GenerationStore>,
        store: Arc<dyn PerformanceStore>,
    ) -> Self {
        Self {
            secret,
            generations,
            store,
        }
    }

    pub async fn ingest(&self, signature: Option<&str>, body: &[u8]) -> Result<Ack, AppError> {
        if let Err(e) = verify_signature(&self.secret, body, signature) {
            warn!(error = %e, "Rejected performance webhook");
            return Err(e.into());
        }

        let sample = parse_payload(body).map_err(|e| {
            warn!(error = %e, "Rejected performance webhook payload");
            e
        })?;

        if self
            .generations
            .get_generation(sample.generation_id)
            .await?
            .is_none()
        {
            warn!(generation_id = %sample.generation_id, "Performance webhook for unknown generation");
            return Err(WebhookValidationError::UnknownGeneration(sample.generation_id).into());
        }

        let record = self.store.append_performance(&sample).await?;
        info!(
            generation_id = %record.generation_id,
            platform = %record.platform,
            impressions = record.impressions,
            engagement_rate = record.engagement_rate,
            "Performance snapshot recorded"
        );
        Ok(Ack {
            received: true,
            record_id: record.id,
        })
    }
}
