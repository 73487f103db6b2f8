// Prompt constants for pattern extraction and pattern injection.

/// Opens the learned-pattern block injected into generation prompts.
pub const PATTERN_BLOCK_HEADER: &str = "LEARNED PATTERNS from this brand's best-performing ads. \
    Reuse their structure, not their wording:";

/// Closes the learned-pattern block.
pub const PATTERN_BLOCK_FOOTER: &str = "Apply these structural patterns to the new ad. \
    Never reproduce text, prices or offers from the reference ads.";

/// System prompt for structural pattern extraction. Enforces JSON-only output.
pub const EXTRACTION_SYSTEM: &str = "You are an advertising creative analyst. \
    You describe the STRUCTURE of an ad, never its copy. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Extraction prompt template. Replace `{category}` and `{platform}` before sending;
/// the reference image travels alongside as an image input.
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r##"Analyze the attached high-performing {category} ad from {platform}.

Return a JSON object with this EXACT schema (no extra fields):
{
  "pattern": {
    "layout": {
      "structure": "centered_hero | split_screen | grid | full_bleed | text_overlay | product_focus | minimal",
      "text_placement": "where text sits, e.g. 'headline upper third, logo bottom right'",
      "visual_hierarchy": "what the eye reads first, second, third"
    },
    "color": {
      "palette": ["#hex or color name"],
      "mood": "e.g. 'warm and calm'",
      "contrast": "low | medium | high"
    },
    "hook": {
      "hook_type": "question | benefit | social_proof | curiosity | problem | offer | story",
      "headline_style": "typographic and rhetorical style of the headline",
      "cta_style": "shape and tone of the call to action"
    },
    "visual": {
      "image_style": "photographic | illustration | flat | three_dimensional | lifestyle | studio_product",
      "human_presence": true,
      "product_prominence": "how dominant the product is",
      "composition_notes": "framing, angle, negative space"
    }
  },
  "confidence": 0.85
}

HARD RULES:
1. NEVER quote the ad's text, prices, discounts, percentages or deadlines
2. Describe style and placement only
3. `confidence` is your certainty in the extraction, between 0 and 1"##;
