use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::models::generation::{GenerationRecord, GenerationStatus, MediaKind};

#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub template_id: Option<Uuid>,
    pub platform: String,
    pub media_kind: MediaKind,
    pub prompt: String,
    pub applied_pattern_ids: Vec<Uuid>,
}

/// Columns written alongside a status change. `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct GenerationUpdate {
    pub result_url: Option<String>,
    pub result_text: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Inserts the record in `generating` status.
    async fn create_generation(&self, new: &NewGeneration) -> Result<GenerationRecord>;
    async fn get_generation(&self, generation_id: Uuid) -> Result<Option<GenerationRecord>>;
    async fn update_generation(
        &self,
        generation_id: Uuid,
        status: GenerationStatus,
        update: GenerationUpdate,
    ) -> Result<()>;
}

#[async_trait]
impl GenerationStore for PgStore {
    async fn create_generation(&self, new: &NewGeneration) -> Result<GenerationRecord> {
        Ok(sqlx::query_as::<_, GenerationRecord>(
            r#"
            INSERT INTO generations
                (id, user_id, product_id, template_id, platform, media_kind, prompt,
                 status, applied_pattern_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'generating', $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.product_id)
        .bind(new.template_id)
        .bind(&new.platform)
        .bind(new.media_kind.as_str())
        .bind(&new.prompt)
        .bind(&new.applied_pattern_ids)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_generation(&self, generation_id: Uuid) -> Result<Option<GenerationRecord>> {
        Ok(
            sqlx::query_as::<_, GenerationRecord>("SELECT * FROM generations WHERE id = $1")
                .bind(generation_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update_generation(
        &self,
        generation_id: Uuid,
        status: GenerationStatus,
        update: GenerationUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE generations
            SET status = $2,
                result_url = COALESCE($3, result_url),
                result_text = COALESCE($4, result_text),
                error_message = COALESCE($5, error_message),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(generation_id)
        .bind(status.as_str())
        .bind(update.result_url)
        .bind(update.result_text)
        .bind(update.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
