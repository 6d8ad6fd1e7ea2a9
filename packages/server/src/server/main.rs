// Main entry point for the entity-set API server

use std::sync::Arc;

use anyhow::{Context, Result};
use portal_core::domains::entityset::{EntitySetService, EntitySetStore, UnionAnalysisStore};
use portal_core::kernel::{InMemorySearchService, JobRunner, JobRunnerConfig, NullResolver};
use portal_core::server::{build_app, AppState};
use portal_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portal_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting entity-set API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Start the background job runner
    let runner = Arc::new(JobRunner::start(JobRunnerConfig {
        workers: config.job_workers,
        queue_depth: config.job_queue_depth,
        ..Default::default()
    }));

    // The search index client and display resolver are deployment-specific
    // collaborators; standalone runs fall back to the in-memory stand-ins.
    let search = Arc::new(InMemorySearchService::new());
    let resolver = Arc::new(NullResolver);

    let service = Arc::new(EntitySetService::new(
        Arc::new(EntitySetStore::new()),
        Arc::new(UnionAnalysisStore::new()),
        search,
        Arc::clone(&runner),
        (&config).into(),
    ));

    let app = build_app(AppState {
        service,
        resolver,
        runner: Arc::clone(&runner),
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    runner.stop().await;
    Ok(())
}
