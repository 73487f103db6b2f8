//! Charges that stay provisional until a generation is delivered.
//!
//! Dispatch takes one quota unit up front. A delivered generation keeps the
//! unit and bumps the usage count of every applied pattern; anything else
//! gives the unit back. Synchronous outputs settle inside the dispatcher,
//! provider jobs settle when the tracker writes their terminal state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::generation::quota::{QuotaPolicy, QuotaStore};
use crate::patterns::store::PatternStore;

#[derive(Clone)]
pub struct UsageLedger {
    quota: Arc<dyn QuotaStore>,
    patterns: Arc<dyn PatternStore>,
    policy: QuotaPolicy,
}

impl UsageLedger {
    pub fn new(
        quota: Arc<dyn QuotaStore>,
        patterns: Arc<dyn PatternStore>,
        policy: QuotaPolicy,
    ) -> Self {
        Self {
            quota,
            patterns,
            policy,
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub fn quota(&self) -> &Arc<dyn QuotaStore> {
        &self.quota
    }

    /// Records one application of each pattern.
    pub async fn delivered(&self, user_id: Uuid, applied_pattern_ids: &[Uuid]) {
        if let Err(e) = self.patterns.increment_usage(applied_pattern_ids).await {
            warn!(user_id = %user_id, error = %e, "Failed to record pattern usage");
        }
    }

    /// Gives back the unit taken for a request made at `requested_at`.
    pub async fn refund(&self, user_id: Uuid, requested_at: DateTime<Utc>) {
        let key = self.policy.key(user_id, requested_at);
        if let Err(e) = self.quota.release(&key).await {
            warn!(user_id = %user_id, error = %e, "Failed to release quota unit");
        }
    }
}
