use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::errors::AppError;
use crate::performance::webhook::{Ack, SIGNATURE_HEADER};
use crate::state::AppState;

/// POST /api/v1/webhooks/performance
///
/// Takes the raw body so the signature is checked over the exact bytes sent.
pub async fn handle_performance_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let ack = state.performance.ingest(signature, &body).await?;
    Ok(Json(ack))
}
