use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::PgStore;
use crate::jobs::state::JobState;
use crate::models::generation::{GenerationJobRow, GenerationStatus};

/// Terminal outcome written by the single finalizer of a job.
#[derive(Debug, Clone)]
pub struct JobFinal {
    pub state: JobState,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl JobFinal {
    /// Status the owning generation takes when the job ends in this state.
    pub fn generation_status(&self) -> GenerationStatus {
        if self.state == JobState::Complete {
            GenerationStatus::Completed
        } else {
            GenerationStatus::Failed
        }
    }
}

/// The owning generation of a job whose terminal state was just written.
/// Carries what is needed to settle the generation's charges.
#[derive(Debug, Clone)]
pub struct FinalizedJob {
    pub generation_id: Uuid,
    pub user_id: Uuid,
    pub applied_pattern_ids: Vec<Uuid>,
    pub requested_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(
        &self,
        generation_id: Uuid,
        provider_job_id: &str,
        poll_interval_ms: i64,
    ) -> Result<GenerationJobRow>;
    async fn get_job(&self, job_id: Uuid) -> Result<Option<GenerationJobRow>>;
    /// Jobs still queued or processing, oldest first.
    async fn open_jobs(&self) -> Result<Vec<GenerationJobRow>>;
    async fn mark_processing(&self, job_id: Uuid) -> Result<bool>;
    async fn record_poll(&self, job_id: Uuid, poll_attempts: i32, poll_interval_ms: i64)
        -> Result<()>;
    /// Writes the terminal state and the owning generation's outcome, but only
    /// if the job is still open. Returns `None` when a terminal state was
    /// already recorded.
    async fn finalize_job(&self, job_id: Uuid, outcome: &JobFinal) -> Result<Option<FinalizedJob>>;
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(
        &self,
        generation_id: Uuid,
        provider_job_id: &str,
        poll_interval_ms: i64,
    ) -> Result<GenerationJobRow> {
        Ok(sqlx::query_as::<_, GenerationJobRow>(
            r#"
            INSERT INTO generation_jobs
                (id, generation_id, provider_job_id, state, poll_attempts, poll_interval_ms)
            VALUES ($1, $2, $3, 'queued', 0, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(generation_id)
        .bind(provider_job_id)
        .bind(poll_interval_ms)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<GenerationJobRow>> {
        Ok(
            sqlx::query_as::<_, GenerationJobRow>("SELECT * FROM generation_jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn open_jobs(&self) -> Result<Vec<GenerationJobRow>> {
        Ok(sqlx::query_as::<_, GenerationJobRow>(
            "SELECT * FROM generation_jobs WHERE state IN ('queued', 'processing') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE generation_jobs SET state = 'processing', updated_at = NOW() \
             WHERE id = $1 AND state = 'queued'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_poll(
        &self,
        job_id: Uuid,
        poll_attempts: i32,
        poll_interval_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE generation_jobs SET poll_attempts = $2, poll_interval_ms = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(poll_attempts)
        .bind(poll_interval_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_job(&self, job_id: Uuid, outcome: &JobFinal) -> Result<Option<FinalizedJob>> {
        let mut tx = self.pool.begin().await?;

        let generation_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE generation_jobs
            SET state = $2, result_url = $3, error_message = $4, updated_at = NOW()
            WHERE id = $1 AND state IN ('queued', 'processing')
            RETURNING generation_id
            "#,
        )
        .bind(job_id)
        .bind(outcome.state.as_str())
        .bind(&outcome.result_url)
        .bind(&outcome.error_message)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(generation_id) = generation_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        let (user_id, applied_pattern_ids, requested_at): (Uuid, Vec<Uuid>, DateTime<Utc>) =
            sqlx::query_as(
                r#"
                UPDATE generations
                SET status = $2, result_url = $3, error_message = $4, updated_at = NOW()
                WHERE id = $1
                RETURNING user_id, applied_pattern_ids, created_at
                "#,
            )
            .bind(generation_id)
            .bind(outcome.generation_status().as_str())
            .bind(&outcome.result_url)
            .bind(&outcome.error_message)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(FinalizedJob {
            generation_id,
            user_id,
            applied_pattern_ids,
            requested_at,
        }))
    }
}
