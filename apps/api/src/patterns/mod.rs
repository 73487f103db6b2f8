//! Learned patterns: extraction from reference ads, sanitization, prompt
//! formatting, library management and application feedback.
//!
//! Flow: upload → extract (sanitize, dedup) → library → context assembly
//!       injects the block → generation records the application → rating.

pub mod extraction;
pub mod feedback;
pub mod formatter;
pub mod handlers;
pub mod library;
pub mod prompts;
pub mod sanitizer;
pub mod store;
