use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::dispatcher::RetryPolicy;
use crate::generation::quota::QuotaPolicy;
use crate::jobs::tracker::TrackerConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub model_api_url: String,
    pub model_api_key: String,
    pub social_api_url: String,
    pub performance_webhook_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub quota: QuotaPolicy,
    pub retry: RetryPolicy,
    pub tracker: TrackerConfig,
    pub publish_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let quota_defaults = QuotaPolicy::default();
        let retry_defaults = RetryPolicy::default();
        let tracker_defaults = TrackerConfig::default();

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            model_api_url: require_env("MODEL_API_URL")?,
            model_api_key: require_env("MODEL_API_KEY")?,
            social_api_url: require_env("SOCIAL_API_URL")?,
            performance_webhook_secret: require_env("PERFORMANCE_WEBHOOK_SECRET")?,
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            quota: QuotaPolicy {
                free: optional_env("QUOTA_FREE", quota_defaults.free)?,
                pro: optional_env("QUOTA_PRO", quota_defaults.pro)?,
                enterprise: optional_env("QUOTA_ENTERPRISE", quota_defaults.enterprise)?,
                window: optional_secs("QUOTA_WINDOW_SECS", quota_defaults.window)?,
            },
            retry: RetryPolicy {
                attempt_timeout: optional_secs(
                    "MODEL_ATTEMPT_TIMEOUT_SECS",
                    retry_defaults.attempt_timeout,
                )?,
                ..retry_defaults
            },
            tracker: TrackerConfig {
                poll_interval: optional_secs("JOB_POLL_INTERVAL_SECS", tracker_defaults.poll_interval)?,
                overall_timeout: optional_secs("JOB_TIMEOUT_SECS", tracker_defaults.overall_timeout)?,
                ..tracker_defaults
            },
            publish_timeout: optional_secs("PUBLISH_TIMEOUT_SECS", Duration::from_secs(30))?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn optional_secs(key: &str, default: Duration) -> Result<Duration> {
    optional_env(key, default.as_secs()).map(Duration::from_secs)
}
