use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which pattern went into which generation, with the exact prompt sent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationHistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pattern_id: Uuid,
    pub generation_id: Uuid,
    pub product_id: Uuid,
    pub platform: String,
    pub prompt_used: String,
    pub rating: Option<i16>,
    pub feedback: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub user_id: Uuid,
    pub pattern_id: Uuid,
    pub generation_id: Uuid,
    pub product_id: Uuid,
    pub platform: String,
    pub prompt_used: String,
}
