//! shelf-ingest - Shelf photo resolution service
//!
//! Accepts shelf photographs, resolves the items on them against the user's
//! existing collectables and external catalogs, and reports progress through
//! pollable background jobs.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shelf_common::config::{
    default_config_path, load_toml_or_default, LoggingConfig, RootFolderInitializer,
    RootFolderResolver,
};
use shelf_common::events::EventBus;
use shelf_ingest::config::IngestConfig;
use shelf_ingest::db::{self, SqliteCatalogStore, SqliteReviewQueue};
use shelf_ingest::services::enrichment::{HttpEnrichmentProvider, UnconfiguredEnrichment};
use shelf_ingest::services::extraction::{HttpExtractionAdapter, UnconfiguredExtraction};
use shelf_ingest::services::{
    ConfidenceRouter, EnrichmentProvider, EnrichmentService, ExtractionAdapter, JobTracker,
    MatchingService, PersistenceGateway, ReviewQueueGateway, ReviewService, ScanOrchestrator,
    ScanServices,
};
use shelf_ingest::AppState;

const MODULE_NAME: &str = "shelf-ingest";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

#[derive(Debug, Parser)]
#[command(name = "shelf-ingest", version, about = "Shelf photo resolution service")]
struct Args {
    /// Root folder holding the database (then SHELF_ROOT_FOLDER, config file, OS default)
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Listen address (overrides `bind_address` in the config file)
    #[arg(long)]
    bind: Option<String>,

    /// TOML config file
    #[arg(long, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config = load_toml_or_default(config_path.as_deref());
    init_tracing(&toml_config.logging)?;

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!(
        git_hash = env!("GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Build"
    );

    let ingest_config = IngestConfig::load(config_path.as_deref())
        .context("Invalid shelf-ingest configuration")?;

    let bind_address = args
        .bind
        .clone()
        .or_else(|| toml_config.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

    // Root folder and database
    let resolver = RootFolderResolver::new(MODULE_NAME, toml_config);
    let root_folder = resolver.resolve(args.root_folder.as_deref());
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path).await?;

    // Collaborators
    let event_bus = EventBus::new(100);
    let chain = ingest_config
        .providers
        .build_chain()
        .context("Failed to build catalog providers")?;

    let user_agent = ingest_config.providers.user_agent.clone();
    let extraction: Arc<dyn ExtractionAdapter> = match &ingest_config.extraction.endpoint {
        Some(endpoint) => Arc::new(HttpExtractionAdapter::new(
            endpoint,
            &user_agent,
            ingest_config.extraction.timeout(),
        )?),
        None => {
            tracing::warn!("No extraction endpoint configured, scans will fail");
            Arc::new(UnconfiguredExtraction)
        }
    };
    let enrichment_provider: Arc<dyn EnrichmentProvider> = match &ingest_config.enrichment.endpoint {
        Some(endpoint) => Arc::new(HttpEnrichmentProvider::new(
            endpoint,
            &user_agent,
            ingest_config.enrichment.timeout(),
        )?),
        None => {
            tracing::warn!("No enrichment endpoint configured, enrichment will use fallbacks");
            Arc::new(UnconfiguredEnrichment)
        }
    };

    let store: Arc<dyn PersistenceGateway> = Arc::new(SqliteCatalogStore::new(pool.clone()));
    let review_queue = SqliteReviewQueue::new(pool.clone());
    let review_gateway: Arc<dyn ReviewQueueGateway> = Arc::new(review_queue.clone());

    let matching = MatchingService::new(
        Arc::clone(&store),
        chain.clone(),
        ingest_config.matching.similarity_floor,
    );
    let jobs = JobTracker::new(ingest_config.jobs.ttl());

    let orchestrator = Arc::new(ScanOrchestrator::new(ScanServices {
        extraction,
        router: ConfidenceRouter::new(ingest_config.thresholds()?),
        matching: matching.clone(),
        chain,
        enrichment: EnrichmentService::new(enrichment_provider),
        store: Arc::clone(&store),
        review_queue: Arc::clone(&review_gateway),
        jobs: jobs.clone(),
        event_bus: event_bus.clone(),
    }));
    let reviews = ReviewService::new(review_gateway, store, matching);

    let shutdown = CancellationToken::new();
    let sweeper = jobs.spawn_sweeper(ingest_config.jobs.sweep_interval(), shutdown.clone());

    let state = AppState::new(orchestrator, reviews, review_queue, event_bus);
    let app = shelf_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Job sweeper ended abnormally");
    }
    pool.close().await;
    info!("Stopped");

    Ok(())
}

/// `RUST_LOG` wins over the `[logging] level` key
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        }
    }
    Ok(())
}
