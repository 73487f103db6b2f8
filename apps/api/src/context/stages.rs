//! The individual enrichment stages of the context assembly chain.
//!
//! Each stage reads the context built so far and returns at most one
//! [`Enrichment`]. `Ok(None)` means the source had nothing to add; `Err` is a
//! soft failure that the chain logs and skips.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::models::{Enrichment, GenerationContext, ImageRole, StageKind};
use crate::context::platform::guideline_for;
use crate::context::prompts::{STYLE_REFERENCE_INSTRUCTION, SUBJECT_RULES};
use crate::context::sources::CatalogSource;
use crate::patterns::formatter::{format_for_prompt, MAX_PROMPT_PATTERNS};
use crate::patterns::store::PatternStore;

#[async_trait]
pub trait ContextStage: Send + Sync {
    fn kind(&self) -> StageKind;
    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>>;
}

// ────────────────────────────────────────────────────────────────────────────
// Brand profile
// ────────────────────────────────────────────────────────────────────────────

pub struct BrandProfileStage {
    pub catalog: Arc<dyn CatalogSource>,
}

#[async_trait]
impl ContextStage for BrandProfileStage {
    fn kind(&self) -> StageKind {
        StageKind::BrandProfile
    }

    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>> {
        let Some(brand) = self.catalog.brand_profile(ctx.user_id).await? else {
            return Ok(None);
        };

        let mut text = format!("BRAND: {}.", brand.brand_name.trim());
        if let Some(voice) = brand.voice.as_deref().filter(|v| !v.trim().is_empty()) {
            text.push_str(&format!(" Voice: {}.", voice.trim()));
        }
        if !brand.colors.is_empty() {
            text.push_str(&format!(" Brand colors: {}.", brand.colors.join(", ")));
        }
        if let Some(industry) = brand.industry.as_deref() {
            text.push_str(&format!(" Industry: {industry}."));
        }
        if let Some(audience) = brand.target_audience.as_deref() {
            text.push_str(&format!(" Audience: {audience}."));
        }
        Ok(Some(Enrichment::BrandContext(text)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Brand-DNA insight
// ────────────────────────────────────────────────────────────────────────────

pub struct BrandDnaStage {
    pub catalog: Arc<dyn CatalogSource>,
}

#[async_trait]
impl ContextStage for BrandDnaStage {
    fn kind(&self) -> StageKind {
        StageKind::BrandDna
    }

    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>> {
        let dna = self.catalog.brand_dna(ctx.user_id).await?;
        Ok(dna
            .filter(|d| !d.summary.trim().is_empty())
            .map(|d| {
                Enrichment::BrandDna(format!(
                    "BRAND DNA (what has worked for this brand before): {}",
                    d.summary.trim()
                ))
            }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Learned patterns
// ────────────────────────────────────────────────────────────────────────────

pub struct LearnedPatternStage {
    pub patterns: Arc<dyn PatternStore>,
}

#[async_trait]
impl ContextStage for LearnedPatternStage {
    fn kind(&self) -> StageKind {
        StageKind::LearnedPatterns
    }

    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>> {
        if !ctx.use_learned_patterns {
            return Ok(None);
        }

        let selected = if ctx.explicit_pattern_ids.is_empty() {
            self.patterns
                .active_patterns(
                    ctx.user_id,
                    &ctx.platform,
                    ctx.product.category.as_deref(),
                    MAX_PROMPT_PATTERNS as i64,
                )
                .await?
        } else {
            let mut found = Vec::new();
            for id in ctx.explicit_pattern_ids.iter().take(MAX_PROMPT_PATTERNS) {
                match self.patterns.get_pattern(ctx.user_id, *id).await? {
                    Some(p) if p.is_active => found.push(p),
                    _ => tracing::debug!(pattern_id = %id, "Requested pattern unavailable, skipping"),
                }
            }
            found
        };

        let directives = format_for_prompt(&selected);
        if directives.is_empty() {
            return Ok(None);
        }
        Ok(Some(Enrichment::Patterns {
            directives,
            pattern_ids: selected
                .iter()
                .take(MAX_PROMPT_PATTERNS)
                .map(|p| p.id)
                .collect(),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Style references
// ────────────────────────────────────────────────────────────────────────────

pub struct StyleReferenceStage;

#[async_trait]
impl ContextStage for StyleReferenceStage {
    fn kind(&self) -> StageKind {
        StageKind::StyleReferences
    }

    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>> {
        let references: Vec<_> = ctx
            .uploaded_images
            .iter()
            .filter(|i| i.role == ImageRole::StyleReference)
            .collect();
        if references.is_empty() {
            return Ok(None);
        }

        let mut text = format!("STYLE REFERENCES: {STYLE_REFERENCE_INSTRUCTION}");
        for (i, image) in references.iter().enumerate() {
            let description = image
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or("no description provided");
            text.push_str(&format!("\n- Reference {}: {}", i + 1, description));
        }
        Ok(Some(Enrichment::StyleDirectives(text)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Platform guidelines
// ────────────────────────────────────────────────────────────────────────────

pub struct PlatformGuidelineStage;

#[async_trait]
impl ContextStage for PlatformGuidelineStage {
    fn kind(&self) -> StageKind {
        StageKind::PlatformGuidelines
    }

    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>> {
        Ok(guideline_for(&ctx.platform).map(|g| Enrichment::PlatformGuidelines(g.render())))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Template + product insertion
// ────────────────────────────────────────────────────────────────────────────

/// Always contributes: the subject was resolved before the chain started.
pub struct SubjectStage;

#[async_trait]
impl ContextStage for SubjectStage {
    fn kind(&self) -> StageKind {
        StageKind::Subject
    }

    async fn enrich(&self, ctx: &GenerationContext) -> Result<Option<Enrichment>> {
        let product = &ctx.product;
        let mut text = format!("PRODUCT: {}", product.name.trim());
        if let Some(description) = product.description.as_deref().filter(|d| !d.is_empty()) {
            text.push_str(&format!(". {}", description.trim()));
        }
        if let Some(category) = product.category.as_deref() {
            text.push_str(&format!("\nCategory: {category}"));
        }
        if ctx
            .uploaded_images
            .iter()
            .any(|i| i.role == ImageRole::Product)
            || product.image_url.is_some()
        {
            text.push_str("\nUse the supplied product photo as the exact product appearance.");
        }
        if let Some(template) = &ctx.template {
            text.push_str(&format!(
                "\nTEMPLATE \"{}\" ({}): {}",
                template.name,
                template.category,
                template.blueprint.trim()
            ));
        }
        if let Some(extra) = ctx.user_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            text.push_str(&format!("\nADDITIONAL DIRECTION: {}", extra.trim()));
        }
        text.push_str(&format!("\nFrame: {} aspect ratio. {SUBJECT_RULES}", ctx.aspect_ratio()));
        Ok(Some(Enrichment::Subject(text)))
    }
}
