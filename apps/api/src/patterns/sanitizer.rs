//! Pattern Sanitizer: strips literal ad copy out of extracted patterns.
//!
//! A free-text leaf that trips any detector is replaced wholesale with
//! [`REDACTED`]. Partial redaction would leave copy fragments around the match,
//! so there is none. Enum and boolean leaves pass through untouched.
//!
//! The detectors are heuristics; see DESIGN.md for the known false-negative risk.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::pattern::ExtractedPatternData;

/// Replacement for any field that tripped a detector. Contains no digits,
/// currency symbols or percent signs, so it can never re-trigger a detector.
pub const REDACTED: &str = "[redacted]";

static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[$€£¥]\s?\d|\d(?:[\d,.]*)\s?(?:usd|eur|gbp|dollars?|bucks|euros?)\b")
        .expect("valid regex")
});

static PERCENTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+(?:[.,]\d+)?\s?(?:%|percent\b|pct\b)").expect("valid regex")
});

static URGENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:today only|limited time|act now|hurry|last chance|ends (?:soon|tonight|today)|while (?:supplies|stocks) last|don'?t miss|buy now|order now|shop now|flash sale|only \d+ left|sale ends)\b",
    )
    .expect("valid regex")
});

/// Runs of shouted capitals ending in `!`, e.g. "MEGA SALE!" or "BOGO!".
static SHOUTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z' ]{3,}!").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionReason {
    Currency,
    Percentage,
    Urgency,
}

/// One redacted field: its dotted path and which detector fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redaction {
    pub field: String,
    pub reason: RedactionReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SanitizeReport {
    pub redactions: Vec<Redaction>,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.redactions.is_empty()
    }
}

/// Returns the first detector that matches, checked in currency → percentage → urgency order.
pub fn detect(text: &str) -> Option<RedactionReason> {
    if CURRENCY.is_match(text) {
        Some(RedactionReason::Currency)
    } else if PERCENTAGE.is_match(text) {
        Some(RedactionReason::Percentage)
    } else if URGENCY.is_match(text) || SHOUTING.is_match(text) {
        Some(RedactionReason::Urgency)
    } else {
        None
    }
}

/// Returns `true` if the text contains a currency amount or a percentage.
pub fn contains_numeric_copy(text: &str) -> bool {
    CURRENCY.is_match(text) || PERCENTAGE.is_match(text)
}

/// A single free-text value: unchanged when clean, [`REDACTED`] otherwise.
pub fn sanitize_text(text: &str) -> &str {
    if detect(text).is_some() {
        REDACTED
    } else {
        text
    }
}

/// Sanitizes every free-text leaf of the pattern.
pub fn sanitize(pattern: ExtractedPatternData) -> ExtractedPatternData {
    sanitize_with_report(pattern).0
}

/// Like [`sanitize`], but also reports which fields were redacted and why.
/// The report feeds the upload privacy scan.
pub fn sanitize_with_report(
    mut pattern: ExtractedPatternData,
) -> (ExtractedPatternData, SanitizeReport) {
    let mut report = SanitizeReport::default();

    scrub("layout.text_placement", &mut pattern.layout.text_placement, &mut report);
    scrub("layout.visual_hierarchy", &mut pattern.layout.visual_hierarchy, &mut report);

    for (i, swatch) in pattern.color.palette.iter_mut().enumerate() {
        scrub(&format!("color.palette[{i}]"), swatch, &mut report);
    }
    scrub("color.mood", &mut pattern.color.mood, &mut report);

    scrub("hook.headline_style", &mut pattern.hook.headline_style, &mut report);
    scrub("hook.cta_style", &mut pattern.hook.cta_style, &mut report);

    scrub(
        "visual.product_prominence",
        &mut pattern.visual.product_prominence,
        &mut report,
    );
    scrub(
        "visual.composition_notes",
        &mut pattern.visual.composition_notes,
        &mut report,
    );

    (pattern, report)
}

/// Sanitizes a single free-text value in place, recording the redaction under `field`.
pub fn scrub(field: &str, value: &mut String, report: &mut SanitizeReport) {
    if let Some(reason) = detect(value) {
        *value = REDACTED.to_string();
        report.redactions.push(Redaction {
            field: field.to_string(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_pattern_data;

    #[test]
    fn test_detects_currency_amounts() {
        assert_eq!(detect("Now just $49"), Some(RedactionReason::Currency));
        assert_eq!(detect("save € 20 today"), Some(RedactionReason::Currency));
        assert_eq!(detect("only 15 dollars"), Some(RedactionReason::Currency));
    }

    #[test]
    fn test_detects_percentages() {
        assert_eq!(detect("40% off everything"), Some(RedactionReason::Percentage));
        assert_eq!(detect("up to 12.5 percent"), Some(RedactionReason::Percentage));
    }

    #[test]
    fn test_detects_urgency_phrases() {
        assert_eq!(detect("Today only: free gift"), Some(RedactionReason::Urgency));
        assert_eq!(detect("limited time bundle"), Some(RedactionReason::Urgency));
        assert_eq!(detect("Only 3 left in stock"), Some(RedactionReason::Urgency));
    }

    #[test]
    fn test_detects_shouted_exclamations() {
        assert_eq!(detect("MEGA SALE!"), Some(RedactionReason::Urgency));
        assert_eq!(detect("BOGO!"), Some(RedactionReason::Urgency));
    }

    #[test]
    fn test_structural_descriptions_pass() {
        assert_eq!(detect("headline in upper third, left aligned"), None);
        assert_eq!(detect("warm earthy tones"), None);
        assert_eq!(detect("#F4A261"), None);
        assert_eq!(detect("bold sans-serif question"), None);
    }

    #[test]
    fn test_whole_field_is_replaced_not_partially() {
        let mut data = sample_pattern_data();
        data.hook.headline_style = "Big bold claim: 50% off all shoes this week".to_string();
        let clean = sanitize(data);
        assert_eq!(clean.hook.headline_style, REDACTED);
    }

    #[test]
    fn test_clean_fields_are_untouched() {
        let data = sample_pattern_data();
        let clean = sanitize(data.clone());
        assert_eq!(clean, data);
    }

    #[test]
    fn test_enum_and_bool_leaves_pass_through() {
        let mut data = sample_pattern_data();
        data.visual.composition_notes = "SHOP NOW!".to_string();
        let clean = sanitize(data.clone());
        assert_eq!(clean.layout.structure, data.layout.structure);
        assert_eq!(clean.visual.image_style, data.visual.image_style);
        assert_eq!(clean.visual.human_presence, data.visual.human_presence);
        assert_eq!(clean.hook.hook_type, data.hook.hook_type);
        assert_eq!(clean.visual.composition_notes, REDACTED);
    }

    #[test]
    fn test_sanitized_output_never_contains_numeric_copy() {
        let mut data = sample_pattern_data();
        data.layout.text_placement = "price tag $19.99 bottom right".to_string();
        data.layout.visual_hierarchy = "discount 30% badge".to_string();
        data.color.palette = vec!["#000000".to_string(), "£5 red".to_string()];
        data.color.mood = "25 percent brighter".to_string();
        data.hook.cta_style = "Get 2 for 10 USD".to_string();
        data.visual.product_prominence = "fills 80 % of frame".to_string();

        let clean = sanitize(data);
        let leaves = [
            &clean.layout.text_placement,
            &clean.layout.visual_hierarchy,
            &clean.color.palette[0],
            &clean.color.palette[1],
            &clean.color.mood,
            &clean.hook.headline_style,
            &clean.hook.cta_style,
            &clean.visual.product_prominence,
            &clean.visual.composition_notes,
        ];
        for leaf in leaves {
            assert!(!contains_numeric_copy(leaf), "leaked: {leaf}");
        }
        let json = serde_json::to_string(&clean).unwrap();
        assert!(!contains_numeric_copy(&json), "leaked in: {json}");
    }

    #[test]
    fn test_report_names_redacted_fields() {
        let mut data = sample_pattern_data();
        data.color.palette = vec!["navy".to_string(), "$5 gold".to_string()];
        let (_, report) = sanitize_with_report(data);
        assert_eq!(
            report.redactions,
            vec![Redaction {
                field: "color.palette[1]".to_string(),
                reason: RedactionReason::Currency,
            }]
        );
        assert!(!report.is_clean());
    }

    #[test]
    fn test_sanitize_text_replaces_whole_value() {
        assert_eq!(sanitize_text("shoes $49 - 50% off"), REDACTED);
        assert_eq!(sanitize_text("running shoes"), "running shoes");
    }

    #[test]
    fn test_sentinel_is_stable_under_resanitizing() {
        assert_eq!(detect(REDACTED), None);
    }
}
