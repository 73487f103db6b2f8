//! Ratings on pattern applications.
//!
//! A rating lands on the user's most recent application of the pattern and is
//! written once. Re-rating the same application is a conflict.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::ApplicationHistoryRow;
use crate::patterns::store::PatternStore;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;
const MAX_FEEDBACK_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct RatingRequest {
    pub user_id: Uuid,
    pub rating: i16,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub async fn rate_pattern(
    store: &Arc<dyn PatternStore>,
    pattern_id: Uuid,
    req: &RatingRequest,
) -> Result<ApplicationHistoryRow, AppError> {
    if !(MIN_RATING..=MAX_RATING).contains(&req.rating) {
        return Err(AppError::Validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    let feedback = req
        .feedback
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());
    if feedback.is_some_and(|f| f.chars().count() > MAX_FEEDBACK_CHARS) {
        return Err(AppError::Validation(format!(
            "feedback is limited to {MAX_FEEDBACK_CHARS} characters"
        )));
    }

    let mut application = store
        .latest_application(req.user_id, pattern_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Pattern {pattern_id} has not been applied yet"))
        })?;

    if !store
        .rate_application(application.id, req.rating, feedback)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "Application {} has already been rated",
            application.id
        )));
    }

    info!(
        pattern_id = %pattern_id,
        application_id = %application.id,
        rating = req.rating,
        "Pattern application rated"
    );
    application.rating = Some(req.rating);
    application.feedback = feedback.map(str::to_string);
    Ok(application)
}
