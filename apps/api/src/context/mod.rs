// Context Assembly Stage Chain
// Turns a raw generation request into one ordered, sanitized prompt plus the
// structured context the dispatcher needs (aspect ratio, resolution, patterns).

pub mod chain;
pub mod models;
pub mod platform;
pub mod prompts;
pub mod sources;
pub mod stages;
