//! Renders learned patterns into the prompt-injection block used by context assembly.

use crate::models::pattern::LearnedPattern;
use crate::patterns::prompts::{PATTERN_BLOCK_FOOTER, PATTERN_BLOCK_HEADER};
use crate::patterns::sanitizer::{sanitize, sanitize_text};

/// At most this many patterns are rendered, however many are passed in.
pub const MAX_PROMPT_PATTERNS: usize = 3;

/// Per-field character cap so one verbose extraction cannot crowd out the prompt.
const MAX_FIELD_CHARS: usize = 120;

/// Formats patterns as a numbered directive block.
///
/// Zero patterns produce an empty string, header included. Every field is
/// re-sanitized here, so stored data that predates a detector change still
/// cannot leak copy into a prompt.
pub fn format_for_prompt(patterns: &[LearnedPattern]) -> String {
    if patterns.is_empty() {
        return String::new();
    }

    let mut out = String::from(PATTERN_BLOCK_HEADER);
    out.push('\n');

    for (i, pattern) in patterns.iter().take(MAX_PROMPT_PATTERNS).enumerate() {
        let data = sanitize(pattern.data());
        let palette = data
            .color
            .palette
            .iter()
            .map(|c| clip(c))
            .collect::<Vec<_>>()
            .join(", ");

        out.push_str(&format!(
            "{}. Proven {} pattern ({}):\n",
            i + 1,
            clip(sanitize_text(&pattern.category)),
            pattern.tier().percentile_phrase()
        ));
        out.push_str(&format!(
            "   - Layout: {} structure; text placement: {}; hierarchy: {}\n",
            token(&data.layout.structure),
            clip(&data.layout.text_placement),
            clip(&data.layout.visual_hierarchy)
        ));
        out.push_str(&format!(
            "   - Color: {} mood, {} contrast, palette: {}\n",
            clip(&data.color.mood),
            token(&data.color.contrast),
            if palette.is_empty() { "unspecified".to_string() } else { palette }
        ));
        out.push_str(&format!(
            "   - Hook: {} hook; headline style: {}; call-to-action style: {}\n",
            token(&data.hook.hook_type),
            clip(&data.hook.headline_style),
            clip(&data.hook.cta_style)
        ));
        out.push_str(&format!(
            "   - Visual: {} imagery, {}; product prominence: {}; composition: {}\n",
            token(&data.visual.image_style),
            if data.visual.human_presence {
                "people present"
            } else {
                "no people"
            },
            clip(&data.visual.product_prominence),
            clip(&data.visual.composition_notes)
        ));
    }

    out.push_str(PATTERN_BLOCK_FOOTER);
    out
}

/// Serializes an enum token (`split_screen`) as readable words (`split screen`).
fn token<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.replace('_', " ")))
        .unwrap_or_default()
}

fn clip(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_FIELD_CHARS {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(MAX_FIELD_CHARS).collect();
        clipped.push('…');
        clipped
    }
}
