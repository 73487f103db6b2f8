use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::models::performance::PerformanceRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct NewPerformanceRecord {
    pub generation_id: Uuid,
    pub platform: String,
    pub impressions: i64,
    pub engagement_rate: f64,
    pub clicks: i64,
    pub conversions: i64,
}

#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// Always inserts a new snapshot. Earlier snapshots are never touched.
    async fn append_performance(&self, new: &NewPerformanceRecord) -> Result<PerformanceRecord>;
    /// Users with performance snapshots newer than their latest Brand-DNA.
    async fn users_pending_brand_refresh(&self) -> Result<Vec<Uuid>>;
}

#[async_trait]
impl PerformanceStore for PgStore {
    async fn append_performance(&self, new: &NewPerformanceRecord) -> Result<PerformanceRecord> {
        Ok(sqlx::query_as::<_, PerformanceRecord>(
            r#"
            INSERT INTO performance_records
                (id, generation_id, platform, impressions, engagement_rate, clicks, conversions, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.generation_id)
        .bind(&new.platform)
        .bind(new.impressions)
        .bind(new.engagement_rate)
        .bind(new.clicks)
        .bind(new.conversions)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn users_pending_brand_refresh(&self) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT DISTINCT g.user_id
            FROM performance_records p
            JOIN generations g ON g.id = p.generation_id
            LEFT JOIN LATERAL (
                SELECT MAX(computed_at) AS computed_at FROM brand_dna d WHERE d.user_id = g.user_id
            ) dna ON TRUE
            WHERE dna.computed_at IS NULL OR p.fetched_at > dna.computed_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }
}
