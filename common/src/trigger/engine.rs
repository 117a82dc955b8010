// Trigger loop engine
// One tick: gate → list folder → evaluate → record detection → run report job → commit state.
// Shutdown is observed between ticks; an in-flight tick always completes.

use crate::config::Settings;
use crate::models::ReportJob;
use crate::runner::ReportRunner;
use crate::store::DocumentStore;
use crate::telemetry;
use crate::trigger::strategy::{Detection, SkipReason, TriggerStrategy};
use crate::trigger::{Clock, SystemClock, TriggerPhase};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Static inputs of the loop
#[derive(Debug, Clone)]
pub struct TriggerLoopConfig {
    /// Folder whose listing drives the decision
    pub folder: String,
    pub check_interval: Duration,
    pub job_spec_path: PathBuf,
    pub output_path: PathBuf,
}

impl TriggerLoopConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            folder: settings.document_store.source_folder.clone(),
            check_interval: Duration::from_secs(settings.watcher.check_interval_seconds),
            job_spec_path: PathBuf::from(&settings.runner.job_spec_path),
            output_path: PathBuf::from(&settings.runner.output_path),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Ran { run_id: Uuid, files: Vec<String> },
    RunFailed { run_id: Uuid, error: String },
}

impl TickOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, TickOutcome::Ran { .. })
    }
}

/// Requests a stop of the loop it was taken from
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Polls a folder and runs the report job when the strategy says so
pub struct TriggerLoop {
    config: TriggerLoopConfig,
    store: Arc<dyn DocumentStore>,
    runner: Arc<dyn ReportRunner>,
    strategy: Box<dyn TriggerStrategy>,
    clock: Arc<dyn Clock>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    // Held so the channel never closes while the loop exists
    shutdown_rx: watch::Receiver<bool>,
}

impl TriggerLoop {
    pub fn new(
        config: TriggerLoopConfig,
        store: Arc<dyn DocumentStore>,
        runner: Arc<dyn ReportRunner>,
        strategy: Box<dyn TriggerStrategy>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            store,
            runner,
            strategy,
            clock: Arc::new(SystemClock),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn strategy(&self) -> &dyn TriggerStrategy {
        self.strategy.as_ref()
    }

    pub fn phase(&self) -> TriggerPhase {
        self.strategy.phase(self.clock.now())
    }

    /// Run one decision cycle
    ///
    /// Never fails: listing errors count as "no files". A failed report job
    /// leaves the cooldown untouched so the next tick retries; names detected
    /// by the name-diff strategy stay committed either way.
    #[instrument(skip(self), fields(strategy = %self.strategy.kind(), folder = %self.config.folder))]
    pub async fn tick(&mut self) -> TickOutcome {
        telemetry::record_tick();
        let now = self.clock.now();

        if let Some(reason) = self.strategy.gate(now) {
            if let SkipReason::Cooldown { remaining } = &reason {
                info!(
                    remaining_seconds = remaining.as_secs(),
                    "In cooldown, skipping check"
                );
            } else {
                debug!(reason = %reason, "Skipping check");
            }
            return TickOutcome::Skipped(reason);
        }

        let files = match self.store.list_files(&self.config.folder).await {
            Ok(files) => files,
            Err(e) => {
                telemetry::record_listing_failure();
                if e.is_unauthorized() {
                    error!(
                        error = %e,
                        "Document store rejected the credentials, treating folder as empty"
                    );
                } else {
                    error!(error = %e, "Failed to list folder, treating as empty");
                }
                return TickOutcome::Skipped(SkipReason::ListingFailed);
            }
        };
        debug!(file_count = files.len(), "Listed folder");

        let detected = match self.strategy.evaluate(&files, now) {
            Detection::Skip(reason) => {
                debug!(reason = %reason, "Nothing to do");
                return TickOutcome::Skipped(reason);
            }
            Detection::Fire { files } => files,
        };

        telemetry::record_trigger(&self.strategy.kind().to_string());
        if let Err(e) = self.strategy.record_detection(&detected, now).await {
            // The in-memory state is already committed
            warn!(error = %e, "Failed to persist detected files");
        }

        let job = ReportJob::new(
            &self.config.job_spec_path,
            &self.config.output_path,
            detected.clone(),
        );
        info!(
            run_id = %job.id,
            runner = self.runner.name(),
            files = ?detected,
            "Files detected, running report job"
        );

        let started = Instant::now();
        match self.runner.run(&job).await {
            Ok(report) => {
                let duration = started.elapsed().as_secs_f64();
                telemetry::record_report_run(true, duration);
                info!(
                    run_id = %report.run_id,
                    duration_seconds = duration,
                    "Report job completed"
                );

                if let Err(e) = self.strategy.record_success(&detected, now).await {
                    // The in-memory state is already committed
                    warn!(error = %e, "Failed to persist trigger state");
                }
                TickOutcome::Ran {
                    run_id: job.id,
                    files: detected,
                }
            }
            Err(e) => {
                telemetry::record_report_run(false, started.elapsed().as_secs_f64());
                error!(
                    run_id = %job.id,
                    error = %e,
                    "Report job failed, will retry on next check"
                );
                TickOutcome::RunFailed {
                    run_id: job.id,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Tick until shutdown is requested
    #[instrument(skip(self))]
    pub async fn run(&mut self) {
        info!(
            strategy = %self.strategy.kind(),
            folder = %self.config.folder,
            check_interval_seconds = self.config.check_interval.as_secs_f64(),
            runner = self.runner.name(),
            "Starting trigger loop"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping trigger loop");
                }
            }
        }

        info!("Trigger loop stopped");
    }

    /// Single check, then return
    pub async fn run_once(&mut self) -> TickOutcome {
        info!(folder = %self.config.folder, "Running a single check");
        self.tick().await
    }
}
