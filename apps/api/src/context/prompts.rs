// Fixed prompt fragments used by the context assembly stages.

/// Opening line of every generation prompt.
/// Replace: {media}, {platform}, {product_name}
pub const TASK_TEMPLATE: &str =
    "Create a high-converting {media} advertisement for {product_name}, intended for {platform}.";

/// Closing instruction appended after the subject block.
pub const SUBJECT_RULES: &str = "The product must be the clear focal point. \
    Do not invent prices, discounts, deadlines or claims that are not in the product details.";

/// Instruction attached to each style-reference image.
pub const STYLE_REFERENCE_INSTRUCTION: &str =
    "Match the lighting, palette and composition of the style reference images below. \
    Do not copy any text or logos that appear in them.";
