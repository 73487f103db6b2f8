//! Generation Dispatcher: quota gate plus bounded retry around the model.
//!
//! Flow: consume one unit of the user's windowed budget → up to `max_attempts`
//!       model calls, each under its own timeout, with exponential backoff and
//!       jitter between transient failures → bump usage of applied patterns.
//!
//! A budget unit is given back when the dispatch ultimately fails, so only
//! delivered generations count against the ceiling. A provider job is not
//! delivered yet: its charges are settled by the job tracker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::generation::quota::{QuotaDecision, QuotaPolicy, QuotaStore};
use crate::generation::usage::UsageLedger;
use crate::model_client::{FailureClass, GenerativeModel, ModelError, ModelOutput, ModelRequest};
use crate::models::user::UserTier;
use crate::patterns::store::PatternStore;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait before retry number `retry` (1-based).
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Ceiling plus up to 50% random jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let ceiling = self.backoff_ceiling(retry);
        let jitter_ms = (ceiling.as_millis() / 2) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        ceiling + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    Transient,
    Quota,
    PolicyViolation,
    Auth,
    PermanentUnknown,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationErrorKind::Transient => "transient",
            GenerationErrorKind::Quota => "quota",
            GenerationErrorKind::PolicyViolation => "policy_violation",
            GenerationErrorKind::Auth => "auth",
            GenerationErrorKind::PermanentUnknown => "permanent_unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation quota exceeded ({limit} per {window_secs}s)")]
    QuotaExceeded { limit: u32, window_secs: u64 },

    #[error("Model unavailable after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    #[error("Model rejected the request ({}): {message}", kind.as_str())]
    Permanent {
        kind: GenerationErrorKind,
        message: String,
    },
}

impl GenerationError {
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            GenerationError::QuotaExceeded { .. } => GenerationErrorKind::Quota,
            GenerationError::Transient { .. } => GenerationErrorKind::Transient,
            GenerationError::Permanent { kind, .. } => *kind,
        }
    }

    /// Whether the caller may try the same request again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            GenerationErrorKind::Transient | GenerationErrorKind::Quota
        )
    }
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: Uuid,
    pub tier: UserTier,
    /// Selects the quota window; refunds go back to the same window.
    pub requested_at: DateTime<Utc>,
    pub request: ModelRequest,
    pub applied_pattern_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub output: ModelOutput,
    pub attempts: u32,
}

pub struct GenerationDispatcher {
    model: Arc<dyn GenerativeModel>,
    usage: UsageLedger,
    retry: RetryPolicy,
}

impl GenerationDispatcher {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        quota: Arc<dyn QuotaStore>,
        patterns: Arc<dyn PatternStore>,
        quota_policy: QuotaPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            usage: UsageLedger::new(quota, patterns, quota_policy),
            retry,
        }
    }

    /// The ledger provider jobs are settled against.
    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    pub async fn dispatch(&self, req: &DispatchRequest) -> Result<DispatchOutcome, GenerationError> {
        let policy = self.usage.policy();
        let key = policy.key(req.user_id, req.requested_at);
        let limit = policy.limit_for(req.tier);

        match self
            .usage
            .quota()
            .try_consume(&key, limit, policy.window)
            .await
        {
            Ok(QuotaDecision::Granted { used }) => {
                debug!(user_id = %req.user_id, used, limit, "Generation quota granted");
            }
            Ok(QuotaDecision::Exceeded) => {
                info!(user_id = %req.user_id, limit, tier = req.tier.as_str(), "Generation quota exceeded");
                return Err(GenerationError::QuotaExceeded {
                    limit,
                    window_secs: policy.window.as_secs(),
                });
            }
            Err(e) => {
                error!(user_id = %req.user_id, error = %e, "Quota store unavailable");
                return Err(GenerationError::Transient {
                    attempts: 0,
                    message: "quota store unavailable".to_string(),
                });
            }
        }

        match self.call_with_retry(&req.request).await {
            Ok(outcome) => {
                if !matches!(outcome.output, ModelOutput::Job { .. }) {
                    self.usage
                        .delivered(req.user_id, &req.applied_pattern_ids)
                        .await;
                }
                Ok(outcome)
            }
            Err(err) => {
                self.usage.refund(req.user_id, req.requested_at).await;
                Err(err)
            }
        }
    }

    async fn call_with_retry(&self, request: &ModelRequest) -> Result<DispatchOutcome, GenerationError> {
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.backoff_delay(attempt - 1);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Retrying model call"
                );
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(
                self.retry.attempt_timeout,
                self.model.generate(request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout),
            };

            let err = match result {
                Ok(output) => {
                    info!(attempt, media_type = request.media_type.as_str(), "Model call succeeded");
                    return Ok(DispatchOutcome {
                        output,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            let kind = match err.class() {
                FailureClass::Transient => {
                    last_error = err.to_string();
                    continue;
                }
                FailureClass::Auth => GenerationErrorKind::Auth,
                FailureClass::PolicyViolation => GenerationErrorKind::PolicyViolation,
                FailureClass::Malformed | FailureClass::Unknown => {
                    GenerationErrorKind::PermanentUnknown
                }
            };
            warn!(attempt, kind = kind.as_str(), error = %err, "Model call failed permanently");
            return Err(GenerationError::Permanent {
                kind,
                message: err.to_string(),
            });
        }

        Err(GenerationError::Transient {
            attempts: self.retry.max_attempts,
            message: last_error,
        })
    }
}
