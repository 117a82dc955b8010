// Enricher binary entry point
// Runs the rejection enrichment once: newest dump → account join → published workbook

use anyhow::Result;
use common::bootstrap;
use common::config::Settings;
use common::telemetry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    bootstrap::init_telemetry(&settings)?;
    info!("Starting CX rejection enricher");

    settings
        .validate()
        .and_then(|_| settings.validate_enrichment())
        .map_err(|e| {
            error!(error = %e, "Invalid configuration");
            anyhow::anyhow!(e)
        })?;

    let store = bootstrap::init_document_store(&settings)?;
    let runner = bootstrap::init_enrichment_runner(&settings, store)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to initialize enrichment");
            e
        })?;

    let result = runner.enrich_newest().await;
    telemetry::shutdown_tracer();

    match result {
        Ok(Some(outcome)) => {
            info!(
                source_file = %outcome.source_file,
                matched_rows = outcome.matched_rows,
                uploaded_to = %outcome.uploaded_to,
                "Enrichment completed"
            );
            Ok(())
        }
        Ok(None) => {
            info!("No rejection files to enrich");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Enrichment failed");
            Err(e.into())
        }
    }
}
