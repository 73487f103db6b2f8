use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::PgStore;

/// A connected social account. The token never leaves the service.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlatformCredential {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub platform: String,
    /// Platform-side identity posts are authored as.
    pub author_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlatformCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credential(&self, account_id: Uuid) -> Result<Option<PlatformCredential>>;
}

#[async_trait]
impl CredentialSource for PgStore {
    async fn credential(&self, account_id: Uuid) -> Result<Option<PlatformCredential>> {
        Ok(sqlx::query_as::<_, PlatformCredential>(
            r#"
            SELECT id AS account_id, user_id, platform, author_id, access_token, expires_at
            FROM social_accounts
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
