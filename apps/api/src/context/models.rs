use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::context::platform::guideline_for;
use crate::model_client::ResolutionTier;
use crate::models::catalog::{ProductRow, TemplateRow};
use crate::models::generation::MediaKind;

/// Fallback when neither the request, the template nor the platform picks one.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Template {0} not found")]
    TemplateNotFound(Uuid),

    #[error("Subject lookup failed: {0}")]
    SourceUnavailable(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Product,
    StyleReference,
    Logo,
}

/// An image the user attached to the request, already stored elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
    pub role: ImageRole,
    #[serde(default)]
    pub description: Option<String>,
}

/// The request as it arrives from the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGenerationInput {
    pub user_id: Uuid,
    pub product_id: Uuid,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    pub platform: String,
    #[serde(default)]
    pub media_type: MediaKind,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<ResolutionTier>,
    #[serde(default)]
    pub uploaded_images: Vec<UploadedImage>,
    /// Explicitly chosen patterns; when empty the best active patterns are picked.
    #[serde(default)]
    pub pattern_ids: Vec<Uuid>,
    #[serde(default)]
    pub use_learned_patterns: Option<bool>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

/// Which stage produced a fragment. Declaration order is prompt order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Task,
    BrandProfile,
    BrandDna,
    LearnedPatterns,
    StyleReferences,
    PlatformGuidelines,
    Subject,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Task => "task",
            StageKind::BrandProfile => "brand_profile",
            StageKind::BrandDna => "brand_dna",
            StageKind::LearnedPatterns => "learned_patterns",
            StageKind::StyleReferences => "style_references",
            StageKind::PlatformGuidelines => "platform_guidelines",
            StageKind::Subject => "subject",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptFragment {
    pub stage: StageKind,
    pub text: String,
}

/// What a stage contributes. The chain turns it into a fragment plus the
/// matching structured field; stages never touch the context directly.
#[derive(Debug, Clone)]
pub enum Enrichment {
    BrandContext(String),
    BrandDna(String),
    Patterns {
        directives: String,
        pattern_ids: Vec<Uuid>,
    },
    StyleDirectives(String),
    PlatformGuidelines(String),
    Subject(String),
}

impl Enrichment {
    fn text(&self) -> &str {
        match self {
            Enrichment::BrandContext(t)
            | Enrichment::BrandDna(t)
            | Enrichment::StyleDirectives(t)
            | Enrichment::PlatformGuidelines(t)
            | Enrichment::Subject(t) => t,
            Enrichment::Patterns { directives, .. } => directives,
        }
    }
}

/// The accumulator threaded through the stage chain.
///
/// Fragments are private and only grow through [`GenerationContext::enriched`],
/// which consumes the old value. A stage sees `&GenerationContext` and cannot
/// rewrite what an earlier stage appended.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationContext {
    pub user_id: Uuid,
    pub product: ProductRow,
    pub template: Option<TemplateRow>,
    pub uploaded_images: Vec<UploadedImage>,
    pub platform: String,
    pub media_type: MediaKind,
    pub requested_aspect_ratio: Option<String>,
    pub resolution: ResolutionTier,
    pub explicit_pattern_ids: Vec<Uuid>,
    pub use_learned_patterns: bool,
    pub user_prompt: Option<String>,
    pub brand_context: Option<String>,
    pub brand_dna_insight: Option<String>,
    pub pattern_directives: Option<String>,
    pub applied_pattern_ids: Vec<Uuid>,
    pub style_directives: Option<String>,
    pub platform_guidelines: Option<String>,
    fragments: Vec<PromptFragment>,
}

impl GenerationContext {
    pub fn new(
        input: RawGenerationInput,
        product: ProductRow,
        template: Option<TemplateRow>,
        task_line: String,
    ) -> Self {
        Self {
            user_id: input.user_id,
            product,
            template,
            uploaded_images: input.uploaded_images,
            platform: input.platform,
            media_type: input.media_type,
            requested_aspect_ratio: input.aspect_ratio,
            resolution: input.resolution.unwrap_or_default(),
            explicit_pattern_ids: input.pattern_ids,
            use_learned_patterns: input.use_learned_patterns.unwrap_or(true),
            user_prompt: input.user_prompt,
            brand_context: None,
            brand_dna_insight: None,
            pattern_directives: None,
            applied_pattern_ids: Vec::new(),
            style_directives: None,
            platform_guidelines: None,
            fragments: vec![PromptFragment {
                stage: StageKind::Task,
                text: task_line,
            }],
        }
    }

    pub fn fragments(&self) -> &[PromptFragment] {
        &self.fragments
    }

    /// Returns a new context with the stage's contribution appended.
    pub fn enriched(mut self, stage: StageKind, enrichment: Enrichment) -> Self {
        self.fragments.push(PromptFragment {
            stage,
            text: enrichment.text().to_string(),
        });
        match enrichment {
            Enrichment::BrandContext(t) => self.brand_context = Some(t),
            Enrichment::BrandDna(t) => self.brand_dna_insight = Some(t),
            Enrichment::Patterns {
                directives,
                pattern_ids,
            } => {
                self.pattern_directives = Some(directives);
                self.applied_pattern_ids = pattern_ids;
            }
            Enrichment::StyleDirectives(t) => self.style_directives = Some(t),
            Enrichment::PlatformGuidelines(t) => self.platform_guidelines = Some(t),
            Enrichment::Subject(_) => {}
        }
        self
    }

    /// Request → template → platform guideline → square.
    pub fn aspect_ratio(&self) -> String {
        self.requested_aspect_ratio
            .clone()
            .or_else(|| self.template.as_ref().and_then(|t| t.aspect_ratio.clone()))
            .or_else(|| guideline_for(&self.platform).map(|g| g.aspect_ratio.to_string()))
            .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.to_string())
    }

    /// Uploaded images the model should see, in upload order.
    pub fn reference_image_urls(&self) -> Vec<String> {
        self.uploaded_images.iter().map(|i| i.url.clone()).collect()
    }

    pub fn prompt(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Terminal output of the chain.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub prompt: String,
    pub context: GenerationContext,
}

impl From<GenerationContext> for AssembledPrompt {
    fn from(context: GenerationContext) -> Self {
        Self {
            prompt: context.prompt(),
            context,
        }
    }
}
