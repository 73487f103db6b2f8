//! Pattern library management: list, edit and soft-delete learned patterns.
//!
//! Edits go through the sanitizer again, so a hand-edited field can no more
//! carry ad copy than an extracted one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::pattern::{ColorPattern, HookPattern, LayoutPattern, LearnedPattern, VisualPattern};
use crate::patterns::sanitizer::{sanitize_with_report, Redaction};
use crate::patterns::store::PatternStore;

/// Partial edit. Omitted sub-objects keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternEdit {
    pub user_id: Uuid,
    #[serde(default)]
    pub layout: Option<LayoutPattern>,
    #[serde(default)]
    pub color: Option<ColorPattern>,
    #[serde(default)]
    pub hook: Option<HookPattern>,
    #[serde(default)]
    pub visual: Option<VisualPattern>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditedPattern {
    pub pattern: LearnedPattern,
    pub redactions: Vec<Redaction>,
}

pub async fn list_patterns(
    store: &Arc<dyn PatternStore>,
    user_id: Uuid,
) -> Result<Vec<LearnedPattern>, AppError> {
    Ok(store.list_patterns(user_id).await?)
}

pub async fn edit_pattern(
    store: &Arc<dyn PatternStore>,
    pattern_id: Uuid,
    edit: PatternEdit,
) -> Result<EditedPattern, AppError> {
    let current = store
        .get_pattern(edit.user_id, pattern_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound(format!("Pattern {pattern_id} not found")))?;

    let mut data = current.data();
    if let Some(layout) = edit.layout {
        data.layout = layout;
    }
    if let Some(color) = edit.color {
        data.color = color;
    }
    if let Some(hook) = edit.hook {
        data.hook = hook;
    }
    if let Some(visual) = edit.visual {
        data.visual = visual;
    }

    let (data, report) = sanitize_with_report(data);
    let pattern = store
        .update_pattern_data(edit.user_id, pattern_id, &data)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pattern {pattern_id} not found")))?;

    info!(pattern_id = %pattern_id, redactions = report.redactions.len(), "Pattern edited");
    Ok(EditedPattern {
        pattern,
        redactions: report.redactions,
    })
}

/// Deactivates the pattern. History rows that reference it are kept.
pub async fn delete_pattern(
    store: &Arc<dyn PatternStore>,
    user_id: Uuid,
    pattern_id: Uuid,
) -> Result<(), AppError> {
    if !store.deactivate_pattern(user_id, pattern_id).await? {
        return Err(AppError::NotFound(format!("Pattern {pattern_id} not found")));
    }
    info!(pattern_id = %pattern_id, "Pattern deactivated");
    Ok(())
}
