//! Hourly purge of upload records that expired before reaching `complete`.
//!
//! The stored object goes too, best effort: a failed delete is logged and the
//! record stays purged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::media::MediaStore;
use crate::patterns::store::UploadStore;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run(
    uploads: Arc<dyn UploadStore>,
    media: Arc<dyn MediaStore>,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = PURGE_INTERVAL.as_secs(),
        "Upload purge job started"
    );

    let mut interval = tokio::time::interval(PURGE_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Upload purge job stopping");
                break;
            }
            _ = interval.tick() => {
                match purge_once(uploads.as_ref(), media.as_ref(), Utc::now()).await {
                    Ok(0) => tracing::debug!("Upload purge: nothing expired"),
                    Ok(purged) => tracing::info!(purged, "Upload purge: removed expired uploads"),
                    Err(e) => tracing::error!(error = %e, "Upload purge failed"),
                }
            }
        }
    }
}

/// One purge pass. Returns how many records were removed.
pub async fn purge_once(
    uploads: &dyn UploadStore,
    media: &dyn MediaStore,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let purged = uploads.purge_expired(now).await?;
    for upload in &purged {
        if let Err(e) = media.delete(&upload.storage_key).await {
            tracing::warn!(
                upload_id = %upload.id,
                storage_key = %upload.storage_key,
                error = %e,
                "Upload purge: failed to delete stored object"
            );
        }
    }
    Ok(purged.len())
}
