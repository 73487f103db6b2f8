use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::tracker::CancelOutcome;
use crate::models::generation::GenerationJobRow;
use crate::state::AppState;

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationJobRow>, AppError> {
    let job = state
        .tracker
        .status(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok(Json(job))
}

/// POST /api/v1/jobs/:id/cancel
pub async fn handle_cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, AppError> {
    match state.tracker.cancel(id).await? {
        CancelOutcome::NotFound => Err(AppError::NotFound(format!("Job {id} not found"))),
        outcome => Ok(Json(outcome)),
    }
}
