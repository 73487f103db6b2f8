//! Async Job Tracker: follows long-running provider jobs to a terminal state.
//!
//! Every open job is owned by exactly one poll task in this process. The task
//! is the only writer of the job's terminal state, and the store refuses a
//! second terminal write, so a late provider signal can never overwrite an
//! outcome that was already recorded.
//!
//! Poll cadence starts at `poll_interval` and grows by half on every poll up
//! to `max_poll_interval`. An overall deadline bounds the whole job: a provider
//! that never answers ends in `timeout`.
//!
//! Whoever writes the terminal state also settles the generation's charges:
//! `complete` records pattern usage, every other terminal state refunds the
//! quota unit taken at dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::generation::usage::UsageLedger;
use crate::jobs::state::JobState;
use crate::jobs::store::{FinalizedJob, JobFinal, JobStore};
use crate::model_client::{GenerativeModel, ProviderJobState};
use crate::models::generation::GenerationJobRow;

/// Terminal writes are retried this many times before the task gives up and
/// leaves the job open for the next process to resume.
const FINALIZE_ATTEMPTS: u32 = 5;
const FINALIZE_RETRY_BASE: Duration = Duration::from_millis(500);
const FINALIZE_RETRY_MAX: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub overall_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_interval: Duration::from_secs(60),
            overall_timeout: Duration::from_secs(600),
        }
    }
}

impl TrackerConfig {
    pub fn next_interval(&self, current: Duration) -> Duration {
        (current + current / 2).min(self.max_poll_interval)
    }
}

/// Returned to the caller when a generation continues asynchronously.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub generation_id: Uuid,
    pub state: JobState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The live poll task was signalled and will record `cancelled`.
    Requested,
    /// No task owned the job, so `cancelled` was recorded directly.
    Cancelled,
    AlreadyTerminal { state: JobState },
    NotFound,
}

pub struct JobTracker {
    model: Arc<dyn GenerativeModel>,
    store: Arc<dyn JobStore>,
    usage: UsageLedger,
    config: TrackerConfig,
    live: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl JobTracker {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        store: Arc<dyn JobStore>,
        usage: UsageLedger,
        config: TrackerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            model,
            store,
            usage,
            config,
            live: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Persists a new job in `queued` and starts following it.
    pub async fn start(&self, generation_id: Uuid, provider_job_id: &str) -> Result<JobHandle> {
        let job = self
            .store
            .create_job(
                generation_id,
                provider_job_id,
                self.config.poll_interval.as_millis() as i64,
            )
            .await?;

        info!(
            job_id = %job.id,
            generation_id = %generation_id,
            provider_job_id,
            "Tracking provider job"
        );
        self.spawn(&job, self.config.overall_timeout);

        Ok(JobHandle {
            job_id: job.id,
            generation_id,
            state: JobState::Queued,
        })
    }

    /// Picks up jobs left open by a previous process. The deadline keeps
    /// counting from the job's creation.
    pub async fn resume_open_jobs(&self) -> Result<usize> {
        let open = self.store.open_jobs().await?;
        let now = Utc::now();
        for job in &open {
            let elapsed = (now - job.created_at).to_std().unwrap_or_default();
            let remaining = self.config.overall_timeout.saturating_sub(elapsed);
            self.spawn(job, remaining);
        }
        if !open.is_empty() {
            info!(count = open.len(), "Resumed open generation jobs");
        }
        Ok(open.len())
    }

    pub async fn status(&self, job_id: Uuid) -> Result<Option<GenerationJobRow>> {
        self.store.get_job(job_id).await
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelOutcome> {
        let Some(job) = self.store.get_job(job_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        let state = JobState::parse(&job.state).unwrap_or(JobState::Failed);
        if state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal { state });
        }

        let token = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned();
        if let Some(token) = token {
            token.cancel();
            info!(job_id = %job_id, "Cancellation requested for live job");
            return Ok(CancelOutcome::Requested);
        }

        let written = self.store.finalize_job(job_id, &cancelled_final()).await?;
        if let Some(finalized) = written {
            info!(job_id = %job_id, "Cancelled job without a live poll task");
            settle(&self.usage, &finalized, JobState::Cancelled).await;
            Ok(CancelOutcome::Cancelled)
        } else {
            let state = self
                .store
                .get_job(job_id)
                .await?
                .and_then(|j| JobState::parse(&j.state))
                .unwrap_or(JobState::Cancelled);
            Ok(CancelOutcome::AlreadyTerminal { state })
        }
    }

    fn spawn(&self, job: &GenerationJobRow, remaining: Duration) -> JoinHandle<JobState> {
        let cancel = CancellationToken::new();
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id, cancel.clone());

        let task = PollTask {
            job_id: job.id,
            provider_job_id: job.provider_job_id.clone(),
            state: JobState::parse(&job.state).unwrap_or(JobState::Queued),
            poll_attempts: job.poll_attempts,
            deadline: Instant::now() + remaining,
            model: self.model.clone(),
            store: self.store.clone(),
            usage: self.usage.clone(),
            config: self.config,
            cancel,
            shutdown: self.shutdown.clone(),
        };

        let live = self.live.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            let state = task.run().await;
            live.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&job_id);
            state
        })
    }
}

async fn settle(usage: &UsageLedger, job: &FinalizedJob, state: JobState) {
    if state == JobState::Complete {
        usage.delivered(job.user_id, &job.applied_pattern_ids).await;
    } else {
        usage.refund(job.user_id, job.requested_at).await;
    }
}

fn cancelled_final() -> JobFinal {
    JobFinal {
        state: JobState::Cancelled,
        result_url: None,
        error_message: Some("cancelled by user".to_string()),
    }
}

struct PollTask {
    job_id: Uuid,
    provider_job_id: String,
    state: JobState,
    poll_attempts: i32,
    deadline: Instant,
    model: Arc<dyn GenerativeModel>,
    store: Arc<dyn JobStore>,
    usage: UsageLedger,
    config: TrackerConfig,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl PollTask {
    /// Runs until the job is terminal or the process shuts down. On shutdown
    /// the job is left open for the next process to resume.
    async fn run(mut self) -> JobState {
        let mut interval = self.config.poll_interval;

        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.finish(self.timeout_final()).await;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(job_id = %self.job_id, "Shutdown, leaving job open");
                    return self.state;
                }
                _ = self.cancel.cancelled() => {
                    return self.finish(cancelled_final()).await;
                }
                _ = tokio::time::sleep(interval.min(remaining)) => {}
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.finish(self.timeout_final()).await;
            }

            self.poll_attempts += 1;
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => return self.state,
                _ = self.cancel.cancelled() => return self.finish(cancelled_final()).await,
                polled = tokio::time::timeout(remaining, self.model.job_status(&self.provider_job_id)) => polled,
            };

            let status = match polled {
                Err(_) => return self.finish(self.timeout_final()).await,
                Ok(Err(e)) if e.is_transient() => {
                    warn!(
                        job_id = %self.job_id,
                        attempt = self.poll_attempts,
                        error = %e,
                        "Transient error polling job status"
                    );
                    None
                }
                Ok(Err(e)) => {
                    return self
                        .finish(JobFinal {
                            state: JobState::Failed,
                            result_url: None,
                            error_message: Some(e.to_string()),
                        })
                        .await;
                }
                Ok(Ok(status)) => Some(status),
            };

            if let Some(status) = status {
                match status.status {
                    ProviderJobState::Queued => {}
                    ProviderJobState::Processing => {
                        if self.state == JobState::Queued {
                            if let Err(e) = self.store.mark_processing(self.job_id).await {
                                warn!(job_id = %self.job_id, error = %e, "Failed to mark job processing");
                            }
                            self.state = self.state.advance(JobState::Processing);
                        }
                    }
                    ProviderJobState::Succeeded => {
                        let outcome = match status.output_url {
                            Some(url) => JobFinal {
                                state: JobState::Complete,
                                result_url: Some(url),
                                error_message: None,
                            },
                            None => JobFinal {
                                state: JobState::Failed,
                                result_url: None,
                                error_message: Some(
                                    "provider reported success without an output".to_string(),
                                ),
                            },
                        };
                        return self.finish(outcome).await;
                    }
                    ProviderJobState::Failed => {
                        return self
                            .finish(JobFinal {
                                state: JobState::Failed,
                                result_url: None,
                                error_message: Some(
                                    status
                                        .error
                                        .unwrap_or_else(|| "provider reported failure".to_string()),
                                ),
                            })
                            .await;
                    }
                    ProviderJobState::Cancelled => {
                        return self
                            .finish(JobFinal {
                                state: JobState::Cancelled,
                                result_url: None,
                                error_message: Some("cancelled by provider".to_string()),
                            })
                            .await;
                    }
                }
            }

            if let Err(e) = self
                .store
                .record_poll(self.job_id, self.poll_attempts, interval.as_millis() as i64)
                .await
            {
                warn!(job_id = %self.job_id, error = %e, "Failed to record poll attempt");
            }
            interval = self.config.next_interval(interval);
        }
    }

    fn timeout_final(&self) -> JobFinal {
        JobFinal {
            state: JobState::Timeout,
            result_url: None,
            error_message: Some(format!(
                "no terminal status within {}s",
                self.config.overall_timeout.as_secs()
            )),
        }
    }

    /// Single terminal write. If the store already holds a terminal state,
    /// that state wins and `outcome` is discarded. A failing store is retried
    /// with backoff; after the last attempt the job stays open.
    async fn finish(&self, outcome: JobFinal) -> JobState {
        let mut delay = FINALIZE_RETRY_BASE;
        for attempt in 1..=FINALIZE_ATTEMPTS {
            match self.store.finalize_job(self.job_id, &outcome).await {
                Ok(Some(finalized)) => {
                    info!(
                        job_id = %self.job_id,
                        generation_id = %finalized.generation_id,
                        state = outcome.state.as_str(),
                        poll_attempts = self.poll_attempts,
                        "Job reached terminal state"
                    );
                    settle(&self.usage, &finalized, outcome.state).await;
                    return outcome.state;
                }
                Ok(None) => {
                    let stored = self
                        .store
                        .get_job(self.job_id)
                        .await
                        .ok()
                        .flatten()
                        .and_then(|j| JobState::parse(&j.state));
                    warn!(
                        job_id = %self.job_id,
                        discarded = outcome.state.as_str(),
                        "Job already terminal, discarding late signal"
                    );
                    return stored.unwrap_or(outcome.state);
                }
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    warn!(
                        job_id = %self.job_id,
                        attempt,
                        error = %e,
                        "Failed to record terminal job state, retrying"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return self.state,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(FINALIZE_RETRY_MAX);
                }
                Err(e) => {
                    error!(
                        job_id = %self.job_id,
                        state = outcome.state.as_str(),
                        error = %e,
                        "Giving up on terminal job state, job stays open until resumed"
                    );
                }
            }
        }
        self.state
    }
}
