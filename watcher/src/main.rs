// Watcher binary entry point
// Polls the source folder and runs the report job when new files arrive

use anyhow::Result;
use common::bootstrap;
use common::config::Settings;
use common::telemetry;
use common::trigger::TickOutcome;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    bootstrap::init_telemetry(&settings)?;
    info!("Starting CX automation watcher");

    settings.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        anyhow::anyhow!(e)
    })?;

    info!(
        backend = ?settings.document_store.backend,
        source_folder = %settings.document_store.source_folder,
        strategy = %settings.watcher.strategy,
        runner_mode = ?settings.runner.mode,
        run_once = settings.watcher.run_once,
        "Configuration loaded"
    );

    let mut engine = bootstrap::init_trigger_loop(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize trigger loop");
        e
    })?;

    if settings.watcher.run_once {
        match engine.run_once().await {
            TickOutcome::Ran { files, .. } => info!(files = ?files, "Report job completed"),
            TickOutcome::Skipped(reason) => info!(reason = %reason, "Report job not run"),
            TickOutcome::RunFailed { error, .. } => warn!(error = %error, "Report job failed"),
        }
        telemetry::shutdown_tracer();
        return Ok(());
    }

    // Graceful shutdown on Ctrl+C; the current tick finishes first
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal, initiating graceful shutdown"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        shutdown.shutdown();
    });

    engine.run().await;

    telemetry::shutdown_tracer();
    info!("Watcher stopped");
    Ok(())
}
