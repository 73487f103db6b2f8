//! Upload intake and learned-pattern extraction.
//!
//! Flow: store bytes under `uploads/{user}/{upload}` → record (pending,
//!       expires after 24h) → claim pending → processing exactly once →
//!       model describes the structure → privacy scan + sanitize → content
//!       hash dedup → persist → processing → complete.
//!
//! Any failure after the claim moves the upload to `failed` with the message.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::media::MediaStore;
use crate::model_client::GenerativeModel;
use crate::models::pattern::{EngagementTier, LearnedPattern, NewLearnedPattern};
use crate::models::platform::Platform;
use crate::models::upload::{UploadRecord, UploadStatus, UPLOAD_TTL_HOURS};
use crate::patterns::prompts::{EXTRACTION_PROMPT_TEMPLATE, EXTRACTION_SYSTEM};
use crate::patterns::sanitizer::{sanitize_with_report, scrub, Redaction, SanitizeReport};
use crate::patterns::store::{NewUpload, PatternStore, UploadStore, UploadUpdate};
use crate::signing::sha256_hex;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionRequest {
    pub user_id: Uuid,
    pub category: String,
    pub platform: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub engagement_tier: EngagementTier,
}

/// What the sanitizer had to remove from the raw model description.
#[derive(Debug, Clone, Serialize)]
pub struct PrivacyScan {
    pub clean: bool,
    pub redacted_fields: usize,
    pub redactions: Vec<Redaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub upload_id: Uuid,
    pub pattern: LearnedPattern,
    /// True when an identical pattern already existed and was reused.
    pub deduplicated: bool,
    pub privacy_scan: PrivacyScan,
}

pub struct PatternExtractor {
    model: Arc<dyn GenerativeModel>,
    patterns: Arc<dyn PatternStore>,
    uploads: Arc<dyn UploadStore>,
    media: Arc<dyn MediaStore>,
}

impl PatternExtractor {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        patterns: Arc<dyn PatternStore>,
        uploads: Arc<dyn UploadStore>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            model,
            patterns,
            uploads,
            media,
        }
    }

    pub async fn create_upload(
        &self,
        user_id: Uuid,
        original_filename: &str,
        mime_type: &str,
        bytes: Bytes,
    ) -> Result<UploadRecord, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "Uploaded file exceeds {} MB",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(AppError::Validation(format!(
                "Unsupported image type '{mime_type}'. Supported: png, jpeg, webp"
            )));
        }

        let id = Uuid::new_v4();
        let storage_key = format!("uploads/{user_id}/{id}");
        let size_bytes = bytes.len() as i64;
        self.media
            .put(&storage_key, bytes, mime_type)
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        let record = self
            .uploads
            .create_upload(&NewUpload {
                id,
                user_id,
                storage_key,
                original_filename: original_filename.to_string(),
                size_bytes,
                mime_type: mime_type.to_string(),
                expires_at: Utc::now() + Duration::hours(UPLOAD_TTL_HOURS),
            })
            .await?;

        info!(upload_id = %record.id, user_id = %user_id, size_bytes, "Reference ad uploaded");
        Ok(record)
    }

    pub async fn extract(
        &self,
        upload_id: Uuid,
        req: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, AppError> {
        let category = req.category.trim().to_lowercase();
        if category.is_empty() {
            return Err(AppError::Validation("category is required".to_string()));
        }
        let platform = Platform::parse(&req.platform).ok_or_else(|| {
            AppError::Validation(format!("Unsupported platform '{}'", req.platform))
        })?;

        let upload = self
            .uploads
            .get_upload(upload_id)
            .await?
            .filter(|u| u.user_id == req.user_id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {upload_id} not found")))?;
        if upload.is_expired(Utc::now()) {
            return Err(AppError::Conflict(format!("Upload {upload_id} has expired")));
        }

        let claimed = self
            .uploads
            .transition_upload(
                upload_id,
                UploadStatus::Pending,
                UploadStatus::Processing,
                UploadUpdate::default(),
            )
            .await?;
        if !claimed {
            return Err(AppError::Conflict(format!(
                "Upload {upload_id} is already {}",
                upload.status
            )));
        }

        match self.run(&upload, req, &category, platform).await {
            Ok(outcome) => {
                let update = UploadUpdate {
                    pattern_id: Some(outcome.pattern.id),
                    privacy_scan: serde_json::to_value(&outcome.privacy_scan).ok(),
                    error_message: None,
                };
                self.finish(upload_id, UploadStatus::Complete, update).await;
                info!(
                    upload_id = %upload_id,
                    pattern_id = %outcome.pattern.id,
                    deduplicated = outcome.deduplicated,
                    redacted_fields = outcome.privacy_scan.redacted_fields,
                    "Pattern extracted"
                );
                Ok(outcome)
            }
            Err(e) => {
                let update = UploadUpdate {
                    error_message: Some(e.to_string()),
                    ..Default::default()
                };
                self.finish(upload_id, UploadStatus::Failed, update).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        upload: &UploadRecord,
        req: &ExtractionRequest,
        category: &str,
        platform: Platform,
    ) -> Result<ExtractionOutcome, AppError> {
        let image_url = self
            .media
            .presigned_url(&upload.storage_key)
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        // Upload labels are user text and go through the same detectors.
        let mut labels = SanitizeReport::default();
        let mut category = category.to_string();
        scrub("category", &mut category, &mut labels);
        let mut industry = req.industry.clone();
        if let Some(industry) = industry.as_mut() {
            scrub("industry", industry, &mut labels);
        }

        let prompt = EXTRACTION_PROMPT_TEMPLATE
            .replace("{category}", &category)
            .replace("{platform}", platform.as_str());
        let extraction = self
            .model
            .extract_pattern(&image_url, EXTRACTION_SYSTEM, &prompt)
            .await
            .map_err(|e| AppError::Model(e.to_string()))?;

        let (data, report) = sanitize_with_report(extraction.pattern);
        labels.redactions.extend(report.redactions);
        let privacy_scan = PrivacyScan {
            clean: labels.is_clean(),
            redacted_fields: labels.redactions.len(),
            redactions: labels.redactions,
        };

        let canonical = serde_json::to_vec(&data).map_err(anyhow::Error::from)?;
        let source_hash = sha256_hex(&[&canonical, category.as_bytes(), platform.as_str().as_bytes()]);

        if let Some(existing) = self.patterns.find_by_hash(upload.user_id, &source_hash).await? {
            return Ok(ExtractionOutcome {
                upload_id: upload.id,
                pattern: existing,
                deduplicated: true,
                privacy_scan,
            });
        }

        let pattern = self
            .patterns
            .insert_pattern(&NewLearnedPattern {
                user_id: upload.user_id,
                category,
                platform: platform.as_str().to_string(),
                industry,
                data,
                engagement_tier: req.engagement_tier,
                confidence_score: extraction.confidence.clamp(0.0, 1.0),
                source_hash,
            })
            .await?;

        Ok(ExtractionOutcome {
            upload_id: upload.id,
            pattern,
            deduplicated: false,
            privacy_scan,
        })
    }

    async fn finish(&self, upload_id: Uuid, to: UploadStatus, update: UploadUpdate) {
        match self
            .uploads
            .transition_upload(upload_id, UploadStatus::Processing, to, update)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(upload_id = %upload_id, to = to.as_str(), "Upload left processing concurrently"),
            Err(e) => warn!(upload_id = %upload_id, error = %e, "Failed to record upload status"),
        }
    }
}
