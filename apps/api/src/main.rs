mod background;
mod config;
mod context;
mod db;
mod errors;
mod generation;
mod jobs;
mod media;
mod model_client;
mod models;
mod patterns;
mod performance;
mod publish;
mod routes;
mod signing;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::background::brand_refresh::RedisRefreshQueue;
use crate::config::Config;
use crate::context::chain::AssemblyChain;
use crate::db::{create_pool, PgStore};
use crate::generation::dispatcher::GenerationDispatcher;
use crate::generation::pipeline::GenerationPipeline;
use crate::generation::quota::{QuotaStore, RedisQuotaStore};
use crate::generation::usage::UsageLedger;
use crate::jobs::tracker::JobTracker;
use crate::media::S3MediaStore;
use crate::model_client::HttpModelClient;
use crate::patterns::extraction::PatternExtractor;
use crate::performance::webhook::PerformanceIngestor;
use crate::publish::adapter::PublishAdapter;
use crate::publish::service::PublishService;
use crate::publish::transport::ReqwestTransport;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adloop API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let store = Arc::new(PgStore::new(create_pool(&config.database_url).await?));

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let media = Arc::new(S3MediaStore::new(s3, config.s3_bucket.clone()));
    info!(bucket = %config.s3_bucket, "S3 client initialized");

    // Initialize model client
    let model = Arc::new(HttpModelClient::new(
        config.model_api_url.clone(),
        config.model_api_key.clone(),
    )?);
    info!(base_url = %config.model_api_url, "Model client initialized");

    let shutdown = CancellationToken::new();

    // Quota units and pattern usage are settled by the dispatcher or, for
    // provider jobs, by the tracker.
    let quota: Arc<dyn QuotaStore> = Arc::new(RedisQuotaStore::new(redis.clone()));
    let usage = UsageLedger::new(quota.clone(), store.clone(), config.quota);

    // Job tracker, then re-attach jobs left open by a previous run
    let tracker = Arc::new(JobTracker::new(
        model.clone(),
        store.clone(),
        usage,
        config.tracker,
        shutdown.clone(),
    ));
    let resumed = tracker.resume_open_jobs().await?;
    info!(resumed, "Open generation jobs resumed");

    let dispatcher = GenerationDispatcher::new(
        model.clone(),
        quota,
        store.clone(),
        config.quota,
        config.retry,
    );
    let pipeline = GenerationPipeline::new(
        AssemblyChain::standard(store.clone(), store.clone()),
        dispatcher,
        store.clone(),
        store.clone(),
        store.clone(),
        tracker.clone(),
    );

    let publisher = PublishService::new(
        store.clone(),
        store.clone(),
        media.clone(),
        PublishAdapter::new(
            Arc::new(ReqwestTransport::new()?),
            config.social_api_url.clone(),
            config.publish_timeout,
        ),
    );

    let performance = PerformanceIngestor::new(
        config.performance_webhook_secret.clone(),
        store.clone(),
        store.clone(),
    );

    let extractor = PatternExtractor::new(model.clone(), store.clone(), store.clone(), media.clone());

    // Background maintenance
    let purge_task = tokio::spawn(background::upload_purge::run(
        store.clone(),
        media.clone(),
        shutdown.clone(),
    ));
    let refresh_task = tokio::spawn(background::brand_refresh::run(
        store.clone(),
        Arc::new(RedisRefreshQueue::new(redis)),
        shutdown.clone(),
    ));

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        tracker,
        publisher: Arc::new(publisher),
        performance: Arc::new(performance),
        extractor: Arc::new(extractor),
        patterns: store.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Poll tasks leave their jobs open; the next start resumes them.
    shutdown.cancel();
    for (name, task) in [("upload_purge", purge_task), ("brand_refresh", refresh_task)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
    info!("Shutdown complete");

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "adloop-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT (Ctrl-C), starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
