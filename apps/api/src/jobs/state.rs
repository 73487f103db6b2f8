use serde::{Deserialize, Serialize};

/// Lifecycle of a long-running provider job.
///
/// queued → processing → complete | failed | cancelled | timeout.
/// A terminal state is sticky: later signals are discarded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Complete,
    Failed,
    Cancelled,
    Timeout,
}

impl JobState {
    pub const OPEN: [JobState; 2] = [JobState::Queued, JobState::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Timeout => "timeout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobState::Queued),
            "processing" => Some(JobState::Processing),
            "complete" => Some(JobState::Complete),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            "timeout" => Some(JobState::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Queued | JobState::Processing)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            JobState::Queued => next != JobState::Queued,
            JobState::Processing => !matches!(next, JobState::Queued | JobState::Processing),
            _ => false,
        }
    }

    /// The state after observing `next`. Illegal moves keep the current state.
    pub fn advance(self, next: JobState) -> JobState {
        if self.can_transition_to(next) {
            next
        } else {
            self
        }
    }
}
