use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::ApplicationHistoryRow;
use crate::models::pattern::LearnedPattern;
use crate::models::upload::UploadRecord;
use crate::patterns::extraction::{ExtractionOutcome, ExtractionRequest};
use crate::patterns::feedback::{rate_pattern, RatingRequest};
use crate::patterns::library::{delete_pattern, edit_pattern, list_patterns, EditedPattern, PatternEdit};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct PatternListResponse {
    pub patterns: Vec<LearnedPattern>,
}

/// POST /api/v1/patterns/uploads
///
/// Multipart fields: `user_id` and `file` (png, jpeg or webp).
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadRecord>), AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut file: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "user_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                user_id = Some(
                    Uuid::parse_str(text.trim())
                        .map_err(|_| AppError::Validation("user_id must be a UUID".to_string()))?,
                );
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                file = Some((filename, mime, data));
            }
            _ => {}
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
    let (filename, mime, data) =
        file.ok_or_else(|| AppError::Validation("file is required".to_string()))?;

    let record = state
        .extractor
        .create_upload(user_id, &filename, &mime, data)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/v1/patterns/uploads/:id/extract
pub async fn handle_extract(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
    Json(req): Json<ExtractionRequest>,
) -> Result<Json<ExtractionOutcome>, AppError> {
    let outcome = state.extractor.extract(upload_id, &req).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/patterns
pub async fn handle_list_patterns(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<PatternListResponse>, AppError> {
    let patterns = list_patterns(&state.patterns, params.user_id).await?;
    Ok(Json(PatternListResponse { patterns }))
}

/// PATCH /api/v1/patterns/:id
pub async fn handle_edit_pattern(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(edit): Json<PatternEdit>,
) -> Result<Json<EditedPattern>, AppError> {
    let edited = edit_pattern(&state.patterns, id, edit).await?;
    Ok(Json(edited))
}

/// DELETE /api/v1/patterns/:id
pub async fn handle_delete_pattern(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    delete_pattern(&state.patterns, params.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/patterns/:id/rating
pub async fn handle_rate_pattern(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RatingRequest>,
) -> Result<Json<ApplicationHistoryRow>, AppError> {
    let application = rate_pattern(&state.patterns, id, &req).await?;
    Ok(Json(application))
}
