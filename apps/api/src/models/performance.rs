use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One engagement snapshot per webhook delivery. Rows are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PerformanceRecord {
    pub id: Uuid,
    pub generation_id: Uuid,
    pub platform: String,
    pub impressions: i64,
    pub engagement_rate: f64,
    pub clicks: i64,
    pub conversions: i64,
    pub fetched_at: DateTime<Utc>,
}
