// Bootstrap utilities for binary initialization
// Shared wiring for the watcher and enricher binaries

use crate::config::{RunnerMode, Settings, StoreBackend};
use crate::db::{AccountDirectory, DbPool, PgAccountDirectory};
use crate::runner::{CommandRunner, EnrichmentRunner, ReportRunner};
use crate::store::{DocumentStore, LocalFolderStore, SharePointClient};
use crate::telemetry;
use crate::trigger::{build_strategy, TriggerLoop, TriggerLoopConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize logging, and metrics when a port is configured
pub fn init_telemetry(settings: &Settings) -> Result<()> {
    let observability = &settings.observability;
    telemetry::init_logging(
        &observability.log_level,
        observability.tracing_endpoint.as_deref(),
    )?;

    if let Some(port) = observability.metrics_port {
        telemetry::init_metrics(port)?;
    }
    Ok(())
}

/// Initialize database pool
///
/// # Errors
/// Returns error if database pool initialization fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Initialize the document store selected by `document_store.backend`
///
/// # Errors
/// Returns error if the HTTP client cannot be built
#[tracing::instrument(skip(settings), fields(backend = ?settings.document_store.backend))]
pub fn init_document_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    let config = &settings.document_store;
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::SharePoint => Arc::new(
            SharePointClient::from_config(config)
                .context("Failed to initialize SharePoint client")?,
        ),
        StoreBackend::Local => Arc::new(LocalFolderStore::new(&config.site_url)),
    };

    info!(site_url = %config.site_url, "Document store initialized");
    Ok(store)
}

/// Initialize the enrichment pipeline (connects to the account database)
///
/// # Errors
/// Returns error if the database is unreachable or the key pattern is invalid
#[tracing::instrument(skip(settings, store))]
pub async fn init_enrichment_runner(
    settings: &Settings,
    store: Arc<dyn DocumentStore>,
) -> Result<EnrichmentRunner> {
    let db_pool = init_database_pool(settings).await?;
    let accounts: Arc<dyn AccountDirectory> = Arc::new(PgAccountDirectory::new(
        db_pool,
        settings.enrichment.account_query.clone(),
    ));

    EnrichmentRunner::new(
        store,
        accounts,
        settings.document_store.source_folder.clone(),
        settings.document_store.destination_folder.clone(),
        &settings.enrichment,
    )
    .context("Invalid enrichment key pattern")
}

/// Initialize the report runner selected by `runner.mode`
///
/// # Errors
/// Returns error if the enrichment runner cannot be built
pub async fn init_report_runner(
    settings: &Settings,
    store: Arc<dyn DocumentStore>,
) -> Result<Arc<dyn ReportRunner>> {
    let runner: Arc<dyn ReportRunner> = match settings.runner.mode {
        RunnerMode::Command => Arc::new(CommandRunner::from_config(&settings.runner)),
        RunnerMode::Enrichment => Arc::new(init_enrichment_runner(settings, store).await?),
    };

    info!(runner = runner.name(), "Report runner initialized");
    Ok(runner)
}

/// Wire store, runner and strategy into a trigger loop
///
/// # Errors
/// Returns error if any dependency fails to initialize
pub async fn init_trigger_loop(settings: &Settings) -> Result<TriggerLoop> {
    let store = init_document_store(settings)?;
    let runner = init_report_runner(settings, Arc::clone(&store)).await?;
    let strategy = build_strategy(&settings.watcher).await;

    Ok(TriggerLoop::new(
        TriggerLoopConfig::from_settings(settings),
        store,
        runner,
        strategy,
    ))
}
