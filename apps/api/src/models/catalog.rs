use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Read-only views of catalog data owned by other services.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub blueprint: String,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BrandProfileRow {
    pub user_id: Uuid,
    pub brand_name: String,
    pub voice: Option<String>,
    pub colors: Vec<String>,
    pub industry: Option<String>,
    pub target_audience: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BrandDnaRow {
    pub user_id: Uuid,
    pub summary: String,
    pub computed_at: DateTime<Utc>,
}
