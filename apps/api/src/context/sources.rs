//! Read-only catalog collaborators consumed by context assembly and the dispatcher.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::models::catalog::{BrandDnaRow, BrandProfileRow, ProductRow, TemplateRow};
use crate::models::user::UserTier;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Only returns the product if `user_id` owns it.
    async fn product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<ProductRow>>;
    async fn template(&self, template_id: Uuid) -> Result<Option<TemplateRow>>;
    async fn brand_profile(&self, user_id: Uuid) -> Result<Option<BrandProfileRow>>;
    async fn brand_dna(&self, user_id: Uuid) -> Result<Option<BrandDnaRow>>;
    async fn user_tier(&self, user_id: Uuid) -> Result<UserTier>;
}

#[async_trait]
impl CatalogSource for PgStore {
    async fn product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<ProductRow>> {
        Ok(sqlx::query_as::<_, ProductRow>(
            "SELECT id, user_id, name, description, category, image_url FROM products WHERE id = $1 AND user_id = $2",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn template(&self, template_id: Uuid) -> Result<Option<TemplateRow>> {
        Ok(sqlx::query_as::<_, TemplateRow>(
            "SELECT id, name, category, blueprint, aspect_ratio FROM ad_templates WHERE id = $1",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn brand_profile(&self, user_id: Uuid) -> Result<Option<BrandProfileRow>> {
        Ok(sqlx::query_as::<_, BrandProfileRow>(
            r#"
            SELECT user_id, brand_name, voice, colors, industry, target_audience
            FROM brand_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn brand_dna(&self, user_id: Uuid) -> Result<Option<BrandDnaRow>> {
        Ok(sqlx::query_as::<_, BrandDnaRow>(
            r#"
            SELECT user_id, summary, computed_at
            FROM brand_dna
            WHERE user_id = $1
            ORDER BY computed_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn user_tier(&self, user_id: Uuid) -> Result<UserTier> {
        let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tier.map(|t| UserTier::parse(&t)).unwrap_or_default())
    }
}
