//! Brand-DNA re-analysis trigger.
//!
//! Periodically pushes every user whose performance snapshots are newer than
//! their latest Brand-DNA onto the `brand_dna:refresh` Redis list. The
//! re-computation itself happens in whatever consumes that list.
//!
//! A pushed user is held by a `brand_dna:refresh:held:{user}` marker for
//! [`REFRESH_HOLD`], so later passes skip them while the consumer catches up.
//! Once the marker expires a user that is still stale is pushed again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::performance::store::PerformanceStore;

pub const REFRESH_QUEUE_KEY: &str = "brand_dna:refresh";
const REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const REFRESH_HOLD: Duration = Duration::from_secs(6 * 60 * 60);

fn held_key(user_id: &Uuid) -> String {
    format!("{REFRESH_QUEUE_KEY}:held:{user_id}")
}

#[async_trait]
pub trait RefreshQueue: Send + Sync {
    /// Pushes the users not already held. Returns how many were pushed.
    async fn enqueue(&self, user_ids: &[Uuid]) -> anyhow::Result<usize>;
}

pub struct RedisRefreshQueue {
    client: redis::Client,
}

impl RedisRefreshQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RefreshQueue for RedisRefreshQueue {
    async fn enqueue(&self, user_ids: &[Uuid]) -> anyhow::Result<usize> {
        if user_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut fresh = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let held: Option<String> = redis::cmd("SET")
                .arg(held_key(user_id))
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(REFRESH_HOLD.as_secs())
                .query_async(&mut conn)
                .await?;
            if held.is_some() {
                fresh.push(user_id.to_string());
            }
        }
        if !fresh.is_empty() {
            let _: i64 = conn.lpush(REFRESH_QUEUE_KEY, &fresh).await?;
        }
        Ok(fresh.len())
    }
}

pub async fn run(
    performance: Arc<dyn PerformanceStore>,
    queue: Arc<dyn RefreshQueue>,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = REFRESH_INTERVAL.as_secs(),
        queue = REFRESH_QUEUE_KEY,
        "Brand refresh trigger started"
    );

    let mut interval = tokio::time::interval(REFRESH_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Brand refresh trigger stopping");
                break;
            }
            _ = interval.tick() => {
                match trigger_once(performance.as_ref(), queue.as_ref()).await {
                    Ok(0) => tracing::debug!("Brand refresh: no users pending"),
                    Ok(queued) => tracing::info!(queued, "Brand refresh: users queued"),
                    Err(e) => tracing::error!(error = %e, "Brand refresh trigger failed"),
                }
            }
        }
    }
}

/// One pass. Returns how many users were queued.
pub async fn trigger_once(
    performance: &dyn PerformanceStore,
    queue: &dyn RefreshQueue,
) -> anyhow::Result<usize> {
    let users = performance.users_pending_brand_refresh().await?;
    queue.enqueue(&users).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generation::GenerationStatus;
    use crate::performance::store::NewPerformanceRecord;
    use crate::testing::{MemoryRefreshQueue, MemoryStore};

    fn snapshot(generation_id: Uuid) -> NewPerformanceRecord {
        NewPerformanceRecord {
            generation_id,
            platform: "instagram".to_string(),
            impressions: 500,
            engagement_rate: 3.2,
            clicks: 12,
            conversions: 1,
        }
    }

    #[tokio::test]
    async fn test_users_with_fresh_performance_are_queued_once() {
        let store = MemoryStore::default();
        let queue = MemoryRefreshQueue::default();
        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Completed);
        store.append_performance(&snapshot(generation.id)).await.unwrap();
        store.append_performance(&snapshot(generation.id)).await.unwrap();

        let queued = trigger_once(&store, &queue).await.unwrap();

        assert_eq!(queued, 1);
        assert_eq!(queue.queued(), vec![user]);
    }

    #[tokio::test]
    async fn test_users_with_newer_brand_dna_are_skipped() {
        let store = MemoryStore::default();
        let queue = MemoryRefreshQueue::default();
        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Completed);
        store.append_performance(&snapshot(generation.id)).await.unwrap();
        store.add_brand_dna(user);

        assert_eq!(trigger_once(&store, &queue).await.unwrap(), 0);
        assert!(queue.queued().is_empty());
    }

    #[tokio::test]
    async fn test_held_users_are_not_pushed_again() {
        let store = MemoryStore::default();
        let queue = MemoryRefreshQueue::default();
        let first = Uuid::new_v4();
        let generation = store.add_generation(first, GenerationStatus::Completed);
        store.append_performance(&snapshot(generation.id)).await.unwrap();

        assert_eq!(trigger_once(&store, &queue).await.unwrap(), 1);
        assert_eq!(trigger_once(&store, &queue).await.unwrap(), 0);

        let second = Uuid::new_v4();
        let generation = store.add_generation(second, GenerationStatus::Completed);
        store.append_performance(&snapshot(generation.id)).await.unwrap();

        assert_eq!(trigger_once(&store, &queue).await.unwrap(), 1);
        assert_eq!(queue.queued(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_expired_hold_pushes_a_still_stale_user() {
        let store = MemoryStore::default();
        let queue = MemoryRefreshQueue::default();
        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Completed);
        store.append_performance(&snapshot(generation.id)).await.unwrap();

        trigger_once(&store, &queue).await.unwrap();
        queue.release_holds();

        assert_eq!(trigger_once(&store, &queue).await.unwrap(), 1);
        assert_eq!(queue.queued(), vec![user, user]);
    }
}
