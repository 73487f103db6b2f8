use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Structural tokens: carry no literal ad copy, never redacted
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStructure {
    CenteredHero,
    SplitScreen,
    Grid,
    FullBleed,
    TextOverlay,
    ProductFocus,
    Minimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContrastLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    Question,
    Benefit,
    SocialProof,
    Curiosity,
    Problem,
    Offer,
    Story,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageStyle {
    Photographic,
    Illustration,
    Flat,
    ThreeDimensional,
    Lifestyle,
    StudioProduct,
}

// ────────────────────────────────────────────────────────────────────────────
// Extracted pattern sub-objects
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutPattern {
    pub structure: LayoutStructure,
    pub text_placement: String,
    pub visual_hierarchy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorPattern {
    pub palette: Vec<String>,
    pub mood: String,
    pub contrast: ContrastLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookPattern {
    pub hook_type: HookType,
    pub headline_style: String,
    pub cta_style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualPattern {
    pub image_style: ImageStyle,
    pub human_presence: bool,
    pub product_prominence: String,
    pub composition_notes: String,
}

/// The structural description of a reference ad, as returned by extraction.
/// Every `String` leaf is free text and must go through the sanitizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedPatternData {
    pub layout: LayoutPattern,
    pub color: ColorPattern,
    pub hook: HookPattern,
    pub visual: VisualPattern,
}

// ────────────────────────────────────────────────────────────────────────────
// Engagement tier
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngagementTier {
    #[serde(rename = "top_1")]
    Top1,
    #[serde(rename = "top_5")]
    Top5,
    #[serde(rename = "top_10")]
    Top10,
    #[serde(rename = "top_25")]
    Top25,
    #[default]
    Average,
}

impl EngagementTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementTier::Top1 => "top_1",
            EngagementTier::Top5 => "top_5",
            EngagementTier::Top10 => "top_10",
            EngagementTier::Top25 => "top_25",
            EngagementTier::Average => "average",
        }
    }

    /// Unknown strings fall back to `Average` so a bad row never inflates a pattern.
    pub fn parse(value: &str) -> Self {
        match value {
            "top_1" => EngagementTier::Top1,
            "top_5" => EngagementTier::Top5,
            "top_10" => EngagementTier::Top10,
            "top_25" => EngagementTier::Top25,
            _ => EngagementTier::Average,
        }
    }

    pub fn percentile_phrase(&self) -> &'static str {
        match self {
            EngagementTier::Top1 => "top 1 percentile",
            EngagementTier::Top5 => "top 5 percentile",
            EngagementTier::Top10 => "top 10 percentile",
            EngagementTier::Top25 => "top 25 percentile",
            EngagementTier::Average => "average performance",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Persisted pattern
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LearnedPattern {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub platform: String,
    pub industry: Option<String>,
    pub layout_pattern: Json<LayoutPattern>,
    pub color_pattern: Json<ColorPattern>,
    pub hook_pattern: Json<HookPattern>,
    pub visual_pattern: Json<VisualPattern>,
    pub engagement_tier: String,
    pub confidence_score: f64,
    pub source_hash: String,
    pub usage_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearnedPattern {
    pub fn tier(&self) -> EngagementTier {
        EngagementTier::parse(&self.engagement_tier)
    }

    /// Reassembles the sub-objects into the shape the sanitizer works on.
    pub fn data(&self) -> ExtractedPatternData {
        ExtractedPatternData {
            layout: self.layout_pattern.0.clone(),
            color: self.color_pattern.0.clone(),
            hook: self.hook_pattern.0.clone(),
            visual: self.visual_pattern.0.clone(),
        }
    }
}

/// Insert parameters for a freshly extracted (already sanitized) pattern.
#[derive(Debug, Clone)]
pub struct NewLearnedPattern {
    pub user_id: Uuid,
    pub category: String,
    pub platform: String,
    pub industry: Option<String>,
    pub data: ExtractedPatternData,
    pub engagement_tier: EngagementTier,
    pub confidence_score: f64,
    pub source_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_tier_round_trips_through_str() {
        for tier in [
            EngagementTier::Top1,
            EngagementTier::Top5,
            EngagementTier::Top10,
            EngagementTier::Top25,
            EngagementTier::Average,
        ] {
            assert_eq!(EngagementTier::parse(tier.as_str()), tier);
        }
    }

    #[test]
    fn test_unknown_tier_falls_back_to_average() {
        assert_eq!(EngagementTier::parse("top_0"), EngagementTier::Average);
    }

    #[test]
    fn test_tier_serde_uses_snake_names() {
        let json = serde_json::to_string(&EngagementTier::Top5).unwrap();
        assert_eq!(json, "\"top_5\"");
    }
}
