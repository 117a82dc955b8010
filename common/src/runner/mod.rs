// Report runners
// A runner turns one trigger decision into one report job execution.

pub mod command;
pub mod enrichment;

use crate::errors::RunnerError;
use crate::models::{ReportJob, RunReport};
use async_trait::async_trait;

pub use command::CommandRunner;
pub use enrichment::{EnrichmentOutcome, EnrichmentRunner};

/// Executes the downstream report job
#[async_trait]
pub trait ReportRunner: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run the job to completion; `Err` means the job did not succeed
    async fn run(&self, job: &ReportJob) -> Result<RunReport, RunnerError>;
}
