use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::publish::errors::PublishResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub account_id: Uuid,
    #[serde(default)]
    pub caption: Option<String>,
}

/// POST /api/v1/generations/:id/publish
///
/// Platform-side failures are a 200 with `success: false` and a tagged
/// `error_code`; the caller decides on retry from `is_retryable`.
pub async fn handle_publish(
    State(state): State<AppState>,
    Path(generation_id): Path<Uuid>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<PublishResult>, AppError> {
    let result = state
        .publisher
        .publish(generation_id, req.account_id, req.caption)
        .await?;
    Ok(Json(result))
}
