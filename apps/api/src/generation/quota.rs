//! Per-user generation budget.
//!
//! The check and the increment are one atomic step in Redis, so concurrent
//! dispatches from the same user cannot both squeeze under the ceiling.
//!
//! Windows are fixed and the counter key carries the window index. A unit
//! given back later always lands in the window it was taken from, and a
//! counter that drops to zero does not restart its window.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Script;
use uuid::Uuid;

use crate::models::user::UserTier;

/// Compare-and-increment. Returns the new count, or -1 when the ceiling is
/// already reached (the counter is left untouched). The TTL only garbage
/// collects the key; the window itself is fixed by the key name.
const CONSUME_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return -1
end
local used = redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[2]))
return used
"#;

/// Gives back one unit, never going below zero and never creating the key.
const RELEASE_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current > 0 then
    return redis.call('DECR', KEYS[1])
end
return 0
"#;

#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub free: u32,
    pub pro: u32,
    pub enterprise: u32,
    pub window: Duration,
}

impl QuotaPolicy {
    pub fn limit_for(&self, tier: UserTier) -> u32 {
        match tier {
            UserTier::Free => self.free,
            UserTier::Pro => self.pro,
            UserTier::Enterprise => self.enterprise,
        }
    }

    /// Counter key for the user's fixed window containing `at`.
    pub fn key(&self, user_id: Uuid, at: DateTime<Utc>) -> String {
        let window = self.window.as_secs().max(1) as i64;
        format!(
            "quota:generations:{user_id}:{}",
            at.timestamp().div_euclid(window)
        )
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free: 20,
            pro: 200,
            enterprise: 2000,
            window: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Granted { used: u32 },
    Exceeded,
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn try_consume(&self, key: &str, limit: u32, window: Duration) -> Result<QuotaDecision>;
    async fn release(&self, key: &str) -> Result<()>;
}

pub struct RedisQuotaStore {
    client: redis::Client,
    consume: Script,
    release: Script,
}

impl RedisQuotaStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            consume: Script::new(CONSUME_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn try_consume(&self, key: &str, limit: u32, window: Duration) -> Result<QuotaDecision> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let used: i64 = self
            .consume
            .key(key)
            .arg(limit)
            .arg(window.as_secs().max(1) * 2)
            .invoke_async(&mut conn)
            .await?;

        Ok(if used < 0 {
            QuotaDecision::Exceeded
        } else {
            QuotaDecision::Granted { used: used as u32 }
        })
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = self.release.key(key).invoke_async(&mut conn).await?;
        Ok(())
    }
}
