mod config;
mod db;
mod errors;
mod extraction;
mod ledger;
mod llm_client;
mod models;
mod policy;
mod ranking;
mod rating;
mod routes;
mod scheduler;
mod state;
mod validation;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::{Config, S3Config};
use crate::db::create_pool;
use crate::extraction::{DocumentExtractor, LocalExtractor, S3Extractor};
use crate::llm_client::{LlmClient, TextCompletion};
use crate::policy::PolicyStore;
use crate::rating::{RatingOrchestrator, Timeouts};
use crate::routes::build_router;
use crate::scheduler::{Scheduler, SweepRunner};
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

    info!("Starting Rater API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite ledger
    let db = create_pool(&config.database_url, config.db_busy_timeout).await?;

    // Resume storage: S3 / MinIO when a bucket is configured, local disk otherwise
    let extractor: Arc<dyn DocumentExtractor> = match &config.s3 {
        Some(s3) => Arc::new(S3Extractor::new(build_s3_client(s3).await, s3.bucket.clone())),
        None => Arc::new(LocalExtractor::new(&config.upload_dir)),
    };
    info!("Resume extractor initialized ({})", extractor.backend_name());

    // Initialize LLM client
    let llm: Arc<dyn TextCompletion> =
        Arc::new(LlmClient::new(config.anthropic_api_key.clone(), config.llm_timeout)?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let orchestrator = Arc::new(RatingOrchestrator::new(
        db.clone(),
        extractor,
        llm.clone(),
        Timeouts {
            extraction: config.extraction_timeout,
            // `LLM_TIMEOUT_SECS` bounds one HTTP attempt; the outer limit must
            // leave room for the client's retries.
            completion: llm_client::retry_budget(config.llm_timeout),
        },
    ));

    // Scheduler: daily triggers restored from the ledger, threshold poll started
    let runner: Arc<dyn SweepRunner> = orchestrator.clone();
    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        runner,
        config.batch_poll_interval,
    ));
    let policies = Arc::new(PolicyStore::new(db.clone(), scheduler.clone()));
    policies.restore_triggers().await?;
    scheduler.start().await;

    // Build app state
    let state = AppState {
        db,
        llm,
        orchestrator,
        policies,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS once the operator UI origin is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(s3: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &s3.access_key_id,
        &s3.secret_access_key,
        None,
        None,
        "rater-static",
    );

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials);
    if let Some(endpoint) = &s3.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    // MinIO serves buckets by path, not by virtual host.
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(s3.endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
