// Rejection enrichment job
// Newest rejection dump → account lookup → joined workbook in the output folder

use crate::config::EnrichmentConfig;
use crate::db::AccountDirectory;
use crate::errors::RunnerError;
use crate::models::{FileDescriptor, ReportJob, RunReport};
use crate::runner::ReportRunner;
use crate::store::{newest_file, DocumentStore};
use crate::table::{read_table, write_excel_table, Table};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Summary of one enriched file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentOutcome {
    pub source_file: String,
    pub input_rows: usize,
    pub dropped_rows: usize,
    pub matched_rows: usize,
    pub uploaded_to: String,
}

/// Cross-references rejected submissions against customer accounts
pub struct EnrichmentRunner {
    store: Arc<dyn DocumentStore>,
    accounts: Arc<dyn AccountDirectory>,
    source_folder: String,
    destination_folder: String,
    key_column: String,
    key_pattern: Regex,
    account_key_column: String,
    output_prefix: String,
    csv_delimiter: char,
}

impl EnrichmentRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        accounts: Arc<dyn AccountDirectory>,
        source_folder: impl Into<String>,
        destination_folder: impl Into<String>,
        config: &EnrichmentConfig,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            store,
            accounts,
            source_folder: source_folder.into(),
            destination_folder: destination_folder.into(),
            key_column: config.key_column.clone(),
            key_pattern: Regex::new(&config.key_pattern)?,
            account_key_column: config.account_key_column.clone(),
            output_prefix: config.output_prefix.clone(),
            csv_delimiter: config.csv_delimiter,
        })
    }

    /// Name of the workbook published for `source_name`
    pub fn output_name(&self, source_name: &str) -> String {
        let stem = match source_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => source_name,
        };
        format!("{}{}.xlsx", self.output_prefix, stem)
    }

    /// Enrich the most recently modified file of the source folder
    ///
    /// Returns `Ok(None)` when the folder is empty.
    #[instrument(skip(self), fields(folder = %self.source_folder))]
    pub async fn enrich_newest(&self) -> Result<Option<EnrichmentOutcome>, RunnerError> {
        let files = self.store.list_files(&self.source_folder).await?;
        match newest_file(&files) {
            Some(file) => Ok(Some(self.enrich_file(file).await?)),
            None => {
                info!("No files found in the source folder");
                Ok(None)
            }
        }
    }

    /// Download, enrich and publish one file
    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn enrich_file(&self, file: &FileDescriptor) -> Result<EnrichmentOutcome, RunnerError> {
        let bytes = self.store.download_file(&file.path).await?;
        let mut table = read_table(&file.name, &bytes, self.csv_delimiter)?;
        let input_rows = table.len();

        table.normalize_key_column(&self.key_column)?;
        let dropped_rows = table.retain_matching(&self.key_column, &self.key_pattern)?;
        let ids = table.distinct_keys(&self.key_column)?;
        info!(
            input_rows,
            dropped_rows,
            distinct_ids = ids.len(),
            "Prepared rejection rows"
        );

        let accounts = self.accounts.find_accounts(&ids).await?;
        let joined = self.join_accounts(&table, &accounts)?;

        let output = write_excel_table(&joined)?;
        let output_name = self.output_name(&file.name);
        let receipt = self
            .store
            .upload_file(&self.destination_folder, &output_name, &output)
            .await?;

        info!(
            matched_rows = joined.len(),
            uploaded_to = %receipt.path,
            "Enriched file published"
        );

        Ok(EnrichmentOutcome {
            source_file: file.name.clone(),
            input_rows,
            dropped_rows,
            matched_rows: joined.len(),
            uploaded_to: receipt.path,
        })
    }

    fn join_accounts(&self, table: &Table, accounts: &Table) -> Result<Table, RunnerError> {
        // No matching accounts: the directory cannot tell us its columns
        if accounts.headers.is_empty() {
            return Ok(Table::new(table.headers.clone()));
        }
        Ok(table.inner_join(&self.key_column, accounts, &self.account_key_column)?)
    }
}

#[async_trait]
impl ReportRunner for EnrichmentRunner {
    fn name(&self) -> &str {
        "enrichment"
    }

    #[instrument(skip(self, job), fields(run_id = %job.id))]
    async fn run(&self, job: &ReportJob) -> Result<RunReport, RunnerError> {
        let started_at = Utc::now();
        let output = match self.enrich_newest().await? {
            Some(outcome) => json!({
                "status": "enriched",
                "source_file": outcome.source_file,
                "input_rows": outcome.input_rows,
                "dropped_rows": outcome.dropped_rows,
                "matched_rows": outcome.matched_rows,
                "uploaded_to": outcome.uploaded_to,
            }),
            None => json!({ "status": "no_files" }),
        };

        Ok(RunReport {
            run_id: job.id,
            started_at,
            completed_at: Utc::now(),
            output,
        })
    }
}
