//! One generation request end to end.
//!
//! Flow: assemble context → persist generation (`generating`) → dispatch →
//!       synchronous output completes the record, a provider job hands off to
//!       the tracker and the record moves to `processing`.
//!
//! Application history is written once the model accepted the request, one
//! row per applied pattern, carrying the exact prompt that was sent. A job
//! the tracker could not take on fails the generation and returns its quota
//! unit before any history is written.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::chain::AssemblyChain;
use crate::context::models::{AssembledPrompt, RawGenerationInput};
use crate::context::sources::CatalogSource;
use crate::errors::AppError;
use crate::generation::dispatcher::{DispatchRequest, GenerationDispatcher};
use crate::generation::store::{GenerationStore, GenerationUpdate, NewGeneration};
use crate::jobs::tracker::{JobHandle, JobTracker};
use crate::model_client::{ModelOutput, ModelRequest};
use crate::models::application::NewApplication;
use crate::models::generation::{GenerationRecord, GenerationStatus, MediaKind};
use crate::models::user::UserTier;
use crate::patterns::store::PatternStore;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub generation_id: Uuid,
    pub media_type: MediaKind,
    pub result_url: Option<String>,
    pub result_text: Option<String>,
    pub aspect_ratio: String,
    pub attempts: u32,
    pub applied_pattern_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Completed(GenerationResult),
    Pending(JobHandle),
}

pub struct GenerationPipeline {
    chain: AssemblyChain,
    dispatcher: GenerationDispatcher,
    catalog: Arc<dyn CatalogSource>,
    generations: Arc<dyn GenerationStore>,
    patterns: Arc<dyn PatternStore>,
    tracker: Arc<JobTracker>,
}

impl GenerationPipeline {
    pub fn new(
        chain: AssemblyChain,
        dispatcher: GenerationDispatcher,
        catalog: Arc<dyn CatalogSource>,
        generations: Arc<dyn GenerationStore>,
        patterns: Arc<dyn PatternStore>,
        tracker: Arc<JobTracker>,
    ) -> Self {
        Self {
            chain,
            dispatcher,
            catalog,
            generations,
            patterns,
            tracker,
        }
    }

    pub async fn submit(&self, input: RawGenerationInput) -> Result<SubmitOutcome, AppError> {
        let assembled = self.chain.assemble(input).await?;
        let ctx = &assembled.context;

        let tier = match self.catalog.user_tier(ctx.user_id).await {
            Ok(tier) => tier,
            Err(e) => {
                warn!(user_id = %ctx.user_id, error = %e, "Tier lookup failed, applying free quota");
                UserTier::Free
            }
        };

        let generation = self
            .generations
            .create_generation(&NewGeneration {
                user_id: ctx.user_id,
                product_id: ctx.product.id,
                template_id: ctx.template.as_ref().map(|t| t.id),
                platform: ctx.platform.clone(),
                media_kind: ctx.media_type,
                prompt: assembled.prompt.clone(),
                applied_pattern_ids: ctx.applied_pattern_ids.clone(),
            })
            .await?;

        let request = DispatchRequest {
            user_id: ctx.user_id,
            tier,
            requested_at: generation.created_at,
            request: ModelRequest {
                prompt: assembled.prompt.clone(),
                media_type: ctx.media_type,
                aspect_ratio: ctx.aspect_ratio().to_string(),
                resolution: ctx.resolution,
                reference_images: ctx.reference_image_urls(),
            },
            applied_pattern_ids: ctx.applied_pattern_ids.clone(),
        };

        let outcome = match self.dispatcher.dispatch(&request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.mark(
                    generation.id,
                    GenerationStatus::Failed,
                    GenerationUpdate {
                        error_message: Some(err.to_string()),
                        ..Default::default()
                    },
                )
                .await;
                return Err(err.into());
            }
        };

        let (result_url, result_text) = match outcome.output {
            ModelOutput::Job { job_id } => {
                self.mark(generation.id, GenerationStatus::Processing, GenerationUpdate::default())
                    .await;
                let handle = match self.tracker.start(generation.id, &job_id).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        error!(
                            generation_id = %generation.id,
                            provider_job_id = %job_id,
                            error = %e,
                            "Failed to start tracking provider job"
                        );
                        self.mark(
                            generation.id,
                            GenerationStatus::Failed,
                            GenerationUpdate {
                                error_message: Some("job tracking could not be started".to_string()),
                                ..Default::default()
                            },
                        )
                        .await;
                        self.dispatcher
                            .usage()
                            .refund(generation.user_id, generation.created_at)
                            .await;
                        return Err(e.into());
                    }
                };
                self.record_applications(&generation, &assembled).await;
                info!(
                    generation_id = %generation.id,
                    job_id = %handle.job_id,
                    attempts = outcome.attempts,
                    "Generation continues asynchronously"
                );
                return Ok(SubmitOutcome::Pending(handle));
            }
            ModelOutput::Image { url } => (Some(url), None),
            ModelOutput::Text { text } => (None, Some(text)),
        };

        self.record_applications(&generation, &assembled).await;

        self.mark(
            generation.id,
            GenerationStatus::Completed,
            GenerationUpdate {
                result_url: result_url.clone(),
                result_text: result_text.clone(),
                error_message: None,
            },
        )
        .await;

        info!(
            generation_id = %generation.id,
            attempts = outcome.attempts,
            patterns = ctx.applied_pattern_ids.len(),
            "Generation completed"
        );

        Ok(SubmitOutcome::Completed(GenerationResult {
            generation_id: generation.id,
            media_type: ctx.media_type,
            result_url,
            result_text,
            aspect_ratio: ctx.aspect_ratio().to_string(),
            attempts: outcome.attempts,
            applied_pattern_ids: ctx.applied_pattern_ids.clone(),
        }))
    }

    async fn mark(&self, generation_id: Uuid, status: GenerationStatus, update: GenerationUpdate) {
        if let Err(e) = self
            .generations
            .update_generation(generation_id, status, update)
            .await
        {
            warn!(
                generation_id = %generation_id,
                status = status.as_str(),
                error = %e,
                "Failed to update generation status"
            );
        }
    }

    async fn record_applications(&self, generation: &GenerationRecord, assembled: &AssembledPrompt) {
        for pattern_id in &assembled.context.applied_pattern_ids {
            let entry = NewApplication {
                user_id: generation.user_id,
                pattern_id: *pattern_id,
                generation_id: generation.id,
                product_id: generation.product_id,
                platform: generation.platform.clone(),
                prompt_used: assembled.prompt.clone(),
            };
            if let Err(e) = self.patterns.record_application(&entry).await {
                warn!(
                    pattern_id = %pattern_id,
                    generation_id = %generation.id,
                    error = %e,
                    "Failed to record pattern application"
                );
            }
        }
    }
}
