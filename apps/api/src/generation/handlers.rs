//! Axum route handlers for the Generation API.

use axum::{extract::State, http::StatusCode, Json};

use crate::context::models::RawGenerationInput;
use crate::errors::AppError;
use crate::generation::pipeline::SubmitOutcome;
use crate::state::AppState;

/// POST /api/v1/generations
///
/// 200 with the result for image and text, 202 with a job handle for video.
pub async fn handle_create_generation(
    State(state): State<AppState>,
    Json(input): Json<RawGenerationInput>,
) -> Result<(StatusCode, Json<SubmitOutcome>), AppError> {
    if input.platform.trim().is_empty() {
        return Err(AppError::Validation("platform is required".to_string()));
    }

    let outcome = state.pipeline.submit(input).await?;
    let status = match outcome {
        SubmitOutcome::Completed(_) => StatusCode::OK,
        SubmitOutcome::Pending(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}
