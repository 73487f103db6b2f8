//! Closed table of per-platform creative guidelines.
//!
//! Keyed by [`Platform`]; a platform name outside the table yields no
//! guideline (and therefore no prompt fragment) rather than an error.

use crate::models::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDensity {
    Minimal,
    Low,
    Moderate,
}

impl TextDensity {
    fn phrase(&self) -> &'static str {
        match self {
            TextDensity::Minimal => "keep on-image text to a few words or none",
            TextDensity::Low => "keep on-image text short, one headline at most",
            TextDensity::Moderate => "a headline plus one supporting line is acceptable",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlatformGuideline {
    pub platform: Platform,
    pub aspect_ratio: &'static str,
    pub tone: &'static str,
    pub text_density: TextDensity,
}

impl PlatformGuideline {
    pub fn render(&self) -> String {
        format!(
            "PLATFORM GUIDELINES ({}): compose for a {} frame. Tone: {}. Text density: {}.",
            self.platform.as_str(),
            self.aspect_ratio,
            self.tone,
            self.text_density.phrase()
        )
    }
}

const GUIDELINES: &[PlatformGuideline] = &[
    PlatformGuideline {
        platform: Platform::Instagram,
        aspect_ratio: "4:5",
        tone: "aspirational and visual-first",
        text_density: TextDensity::Minimal,
    },
    PlatformGuideline {
        platform: Platform::Facebook,
        aspect_ratio: "1:1",
        tone: "friendly and benefit-led",
        text_density: TextDensity::Low,
    },
    PlatformGuideline {
        platform: Platform::Linkedin,
        aspect_ratio: "1.91:1",
        tone: "professional and credible",
        text_density: TextDensity::Moderate,
    },
    PlatformGuideline {
        platform: Platform::Twitter,
        aspect_ratio: "16:9",
        tone: "punchy and conversational",
        text_density: TextDensity::Low,
    },
    PlatformGuideline {
        platform: Platform::Tiktok,
        aspect_ratio: "9:16",
        tone: "energetic, native and unpolished",
        text_density: TextDensity::Minimal,
    },
    PlatformGuideline {
        platform: Platform::Pinterest,
        aspect_ratio: "2:3",
        tone: "inspirational and idea-driven",
        text_density: TextDensity::Low,
    },
];

pub fn guideline_for(platform: &str) -> Option<&'static PlatformGuideline> {
    let platform = Platform::parse(platform)?;
    GUIDELINES.iter().find(|g| g.platform == platform)
}
