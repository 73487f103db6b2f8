//! Context Assembly: runs the fixed, ordered stage chain for one generation request.
//!
//! Flow: resolve subject (product + optional template) → brand profile →
//!       Brand-DNA → learned patterns → style references → platform guidelines →
//!       template/product insertion → single assembled prompt.
//!
//! Stages run sequentially; order is part of the output contract. Only the
//! subject lookup can fail the chain. Every other stage degrades to "no fragment".

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::models::{AssembledPrompt, ContextError, GenerationContext, RawGenerationInput};
use crate::context::prompts::TASK_TEMPLATE;
use crate::context::sources::CatalogSource;
use crate::context::stages::{
    BrandDnaStage, BrandProfileStage, ContextStage, LearnedPatternStage, PlatformGuidelineStage,
    StyleReferenceStage, SubjectStage,
};
use crate::patterns::store::PatternStore;

pub struct AssemblyChain {
    catalog: Arc<dyn CatalogSource>,
    stages: Vec<Box<dyn ContextStage>>,
}

impl AssemblyChain {
    /// The production chain, in its fixed order.
    pub fn standard(catalog: Arc<dyn CatalogSource>, patterns: Arc<dyn PatternStore>) -> Self {
        let stages: Vec<Box<dyn ContextStage>> = vec![
            Box::new(BrandProfileStage {
                catalog: catalog.clone(),
            }),
            Box::new(BrandDnaStage {
                catalog: catalog.clone(),
            }),
            Box::new(LearnedPatternStage { patterns }),
            Box::new(StyleReferenceStage),
            Box::new(PlatformGuidelineStage),
            Box::new(SubjectStage),
        ];
        Self { catalog, stages }
    }

    pub async fn assemble(&self, input: RawGenerationInput) -> Result<AssembledPrompt, ContextError> {
        let product = self
            .catalog
            .product(input.user_id, input.product_id)
            .await
            .map_err(ContextError::SourceUnavailable)?
            .ok_or(ContextError::ProductNotFound(input.product_id))?;

        let template = match input.template_id {
            Some(template_id) => Some(
                self.catalog
                    .template(template_id)
                    .await
                    .map_err(ContextError::SourceUnavailable)?
                    .ok_or(ContextError::TemplateNotFound(template_id))?,
            ),
            None => None,
        };

        let task_line = TASK_TEMPLATE
            .replace("{media}", input.media_type.as_str())
            .replace("{product_name}", product.name.trim())
            .replace("{platform}", input.platform.trim());

        let mut ctx = GenerationContext::new(input, product, template, task_line);

        for stage in &self.stages {
            let kind = stage.kind();
            match stage.enrich(&ctx).await {
                Ok(Some(enrichment)) => ctx = ctx.enriched(kind, enrichment),
                Ok(None) => debug!(stage = kind.as_str(), "Context stage had nothing to add"),
                Err(e) => warn!(
                    stage = kind.as_str(),
                    user_id = %ctx.user_id,
                    error = %e,
                    "Context stage failed, continuing without its fragment"
                ),
            }
        }

        info!(
            user_id = %ctx.user_id,
            fragments = ctx.fragments().len(),
            patterns = ctx.applied_pattern_ids.len(),
            "Generation context assembled"
        );

        Ok(AssembledPrompt::from(ctx))
    }
}
