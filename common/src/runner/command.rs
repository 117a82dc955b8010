// External process report runner (papermill, the enricher binary, ...)

use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::models::{ReportJob, RunReport};
use crate::runner::ReportRunner;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const OUTPUT_TAIL_CHARS: usize = 2000;

/// Runs the report job as a child process
///
/// Arguments may contain `{job}`, `{output}` and `{run_id}` placeholders.
/// The names of the files that triggered the run are passed in the
/// `CX_DETECTED_FILES` environment variable, one per line.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout_seconds: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.timeout_seconds,
        )
    }

    fn render_args(&self, job: &ReportJob) -> Vec<String> {
        let spec = job.spec_path.display().to_string();
        let output = job.output_path.display().to_string();
        let run_id = job.id.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{job}", &spec)
                    .replace("{output}", &output)
                    .replace("{run_id}", &run_id)
            })
            .collect()
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let skip = text.chars().count().saturating_sub(OUTPUT_TAIL_CHARS);
    text.chars().skip(skip).collect::<String>().trim().to_string()
}

#[async_trait]
impl ReportRunner for CommandRunner {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip(self, job), fields(run_id = %job.id, program = %self.program))]
    async fn run(&self, job: &ReportJob) -> Result<RunReport, RunnerError> {
        let started_at = Utc::now();
        let args = self.render_args(job);
        info!(args = ?args, "Running report job");

        let child = Command::new(&self.program)
            .args(&args)
            .env("CX_DETECTED_FILES", job.detected.join("\n"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RunnerError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!("Report job exceeded its timeout and was killed");
                return Err(RunnerError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = tail(&output.stdout);
        let stderr = tail(&output.stderr);
        debug!(stdout = %stdout, stderr = %stderr, "Report job output");

        if !output.status.success() {
            return Err(RunnerError::NonZeroExit {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(RunReport {
            run_id: job.id,
            started_at,
            completed_at: Utc::now(),
            output: json!({
                "program": self.program,
                "args": args,
                "exit_code": output.status.code(),
                "stdout": stdout,
            }),
        })
    }
}
