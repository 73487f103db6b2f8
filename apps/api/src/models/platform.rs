use serde::{Deserialize, Serialize};

/// Social platforms the service publishes to and receives metrics from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Facebook,
    Linkedin,
    Twitter,
    Tiktok,
    Pinterest,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Tiktok => "tiktok",
            Platform::Pinterest => "pinterest",
        }
    }

    /// Case-insensitive lookup; `None` for anything outside the closed set.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "instagram" => Some(Platform::Instagram),
            "facebook" => Some(Platform::Facebook),
            "linkedin" => Some(Platform::Linkedin),
            "twitter" | "x" => Some(Platform::Twitter),
            "tiktok" => Some(Platform::Tiktok),
            "pinterest" => Some(Platform::Pinterest),
            _ => None,
        }
    }
}
