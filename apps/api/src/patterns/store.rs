//! Persistence seams for learned patterns, upload records and application history.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::PgStore;
use crate::models::application::{ApplicationHistoryRow, NewApplication};
use crate::models::pattern::{ExtractedPatternData, LearnedPattern, NewLearnedPattern};
use crate::models::upload::{UploadRecord, UploadStatus};

#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn insert_pattern(&self, new: &NewLearnedPattern) -> Result<LearnedPattern>;
    async fn find_by_hash(&self, user_id: Uuid, source_hash: &str)
        -> Result<Option<LearnedPattern>>;
    async fn get_pattern(&self, user_id: Uuid, pattern_id: Uuid) -> Result<Option<LearnedPattern>>;
    /// Best active patterns for a platform, optionally narrowed to a category.
    async fn active_patterns(
        &self,
        user_id: Uuid,
        platform: &str,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<LearnedPattern>>;
    async fn list_patterns(&self, user_id: Uuid) -> Result<Vec<LearnedPattern>>;
    /// Caller passes already-sanitized data.
    async fn update_pattern_data(
        &self,
        user_id: Uuid,
        pattern_id: Uuid,
        data: &ExtractedPatternData,
    ) -> Result<Option<LearnedPattern>>;
    async fn deactivate_pattern(&self, user_id: Uuid, pattern_id: Uuid) -> Result<bool>;
    async fn increment_usage(&self, pattern_ids: &[Uuid]) -> Result<()>;

    async fn record_application(&self, new: &NewApplication) -> Result<ApplicationHistoryRow>;
    async fn latest_application(
        &self,
        user_id: Uuid,
        pattern_id: Uuid,
    ) -> Result<Option<ApplicationHistoryRow>>;
    /// Sets the rating only if the row is still unrated. Returns whether it did.
    async fn rate_application(
        &self,
        application_id: Uuid,
        rating: i16,
        feedback: Option<&str>,
    ) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_key: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Columns written alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct UploadUpdate {
    pub pattern_id: Option<Uuid>,
    pub privacy_scan: Option<Value>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn create_upload(&self, new: &NewUpload) -> Result<UploadRecord>;
    async fn get_upload(&self, upload_id: Uuid) -> Result<Option<UploadRecord>>;
    /// Compare-and-set on status. Returns `false` if the record was not in `from`.
    async fn transition_upload(
        &self,
        upload_id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
        update: UploadUpdate,
    ) -> Result<bool>;
    /// Deletes expired records that never completed and returns them.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<UploadRecord>>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

const PATTERN_COLUMNS: &str = "id, user_id, category, platform, industry, layout_pattern, \
    color_pattern, hook_pattern, visual_pattern, engagement_tier, confidence_score, \
    source_hash, usage_count, last_used_at, is_active, created_at, updated_at";

#[async_trait]
impl PatternStore for PgStore {
    async fn insert_pattern(&self, new: &NewLearnedPattern) -> Result<LearnedPattern> {
        let sql = format!(
            r#"
            INSERT INTO learned_patterns
                (id, user_id, category, platform, industry, layout_pattern, color_pattern,
                 hook_pattern, visual_pattern, engagement_tier, confidence_score, source_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PATTERN_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, LearnedPattern>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(&new.category)
            .bind(&new.platform)
            .bind(&new.industry)
            .bind(Json(&new.data.layout))
            .bind(Json(&new.data.color))
            .bind(Json(&new.data.hook))
            .bind(Json(&new.data.visual))
            .bind(new.engagement_tier.as_str())
            .bind(new.confidence_score)
            .bind(&new.source_hash)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_by_hash(
        &self,
        user_id: Uuid,
        source_hash: &str,
    ) -> Result<Option<LearnedPattern>> {
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM learned_patterns \
             WHERE user_id = $1 AND source_hash = $2 AND is_active"
        );
        Ok(sqlx::query_as::<_, LearnedPattern>(&sql)
            .bind(user_id)
            .bind(source_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_pattern(&self, user_id: Uuid, pattern_id: Uuid) -> Result<Option<LearnedPattern>> {
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM learned_patterns WHERE id = $1 AND user_id = $2"
        );
        Ok(sqlx::query_as::<_, LearnedPattern>(&sql)
            .bind(pattern_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_patterns(
        &self,
        user_id: Uuid,
        platform: &str,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<LearnedPattern>> {
        let sql = format!(
            r#"
            SELECT {PATTERN_COLUMNS}
            FROM learned_patterns
            WHERE user_id = $1
              AND is_active
              AND platform = $2
              AND ($3::text IS NULL OR category = $3)
            ORDER BY CASE engagement_tier
                         WHEN 'top_1' THEN 0 WHEN 'top_5' THEN 1 WHEN 'top_10' THEN 2
                         WHEN 'top_25' THEN 3 ELSE 4
                     END,
                     confidence_score DESC,
                     usage_count DESC
            LIMIT $4
            "#
        );
        Ok(sqlx::query_as::<_, LearnedPattern>(&sql)
            .bind(user_id)
            .bind(platform)
            .bind(category)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_patterns(&self, user_id: Uuid) -> Result<Vec<LearnedPattern>> {
        let sql = format!(
            "SELECT {PATTERN_COLUMNS} FROM learned_patterns \
             WHERE user_id = $1 AND is_active ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, LearnedPattern>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_pattern_data(
        &self,
        user_id: Uuid,
        pattern_id: Uuid,
        data: &ExtractedPatternData,
    ) -> Result<Option<LearnedPattern>> {
        let sql = format!(
            r#"
            UPDATE learned_patterns
            SET layout_pattern = $3, color_pattern = $4, hook_pattern = $5,
                visual_pattern = $6, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND is_active
            RETURNING {PATTERN_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, LearnedPattern>(&sql)
            .bind(pattern_id)
            .bind(user_id)
            .bind(Json(&data.layout))
            .bind(Json(&data.color))
            .bind(Json(&data.hook))
            .bind(Json(&data.visual))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn deactivate_pattern(&self, user_id: Uuid, pattern_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE learned_patterns SET is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND is_active",
        )
        .bind(pattern_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_usage(&self, pattern_ids: &[Uuid]) -> Result<()> {
        if pattern_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE learned_patterns
            SET usage_count = usage_count + 1, last_used_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(pattern_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_application(&self, new: &NewApplication) -> Result<ApplicationHistoryRow> {
        Ok(sqlx::query_as::<_, ApplicationHistoryRow>(
            r#"
            INSERT INTO pattern_application_history
                (id, user_id, pattern_id, generation_id, product_id, platform, prompt_used)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.pattern_id)
        .bind(new.generation_id)
        .bind(new.product_id)
        .bind(&new.platform)
        .bind(&new.prompt_used)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn latest_application(
        &self,
        user_id: Uuid,
        pattern_id: Uuid,
    ) -> Result<Option<ApplicationHistoryRow>> {
        Ok(sqlx::query_as::<_, ApplicationHistoryRow>(
            r#"
            SELECT * FROM pattern_application_history
            WHERE user_id = $1 AND pattern_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(pattern_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn rate_application(
        &self,
        application_id: Uuid,
        rating: i16,
        feedback: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pattern_application_history
            SET rating = $2, feedback = $3, rated_at = NOW()
            WHERE id = $1 AND rating IS NULL
            "#,
        )
        .bind(application_id)
        .bind(rating)
        .bind(feedback)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl UploadStore for PgStore {
    async fn create_upload(&self, new: &NewUpload) -> Result<UploadRecord> {
        Ok(sqlx::query_as::<_, UploadRecord>(
            r#"
            INSERT INTO ad_uploads
                (id, user_id, storage_key, original_filename, size_bytes, mime_type, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.user_id)
        .bind(&new.storage_key)
        .bind(&new.original_filename)
        .bind(new.size_bytes)
        .bind(&new.mime_type)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_upload(&self, upload_id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(
            sqlx::query_as::<_, UploadRecord>("SELECT * FROM ad_uploads WHERE id = $1")
                .bind(upload_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn transition_upload(
        &self,
        upload_id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
        update: UploadUpdate,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE ad_uploads
            SET status = $3,
                pattern_id = COALESCE($4, pattern_id),
                privacy_scan = COALESCE($5, privacy_scan),
                error_message = COALESCE($6, error_message),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(upload_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(update.pattern_id)
        .bind(update.privacy_scan)
        .bind(update.error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<UploadRecord>> {
        Ok(sqlx::query_as::<_, UploadRecord>(
            "DELETE FROM ad_uploads WHERE expires_at <= $1 AND status <> 'complete' RETURNING *",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }
}
