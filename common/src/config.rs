// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub document_store: DocumentStoreConfig,
    pub database: DatabaseConfig,
    pub watcher: WatcherConfig,
    pub runner: RunnerConfig,
    pub enrichment: EnrichmentConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    SharePoint,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    pub backend: StoreBackend,
    /// Site URL for SharePoint, root directory for the local backend
    pub site_url: String,
    pub source_folder: String,
    pub destination_folder: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// When set, credentials are exchanged for a bearer token at this endpoint
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStrategyKind {
    Cooldown,
    NameDiff,
    Recency,
}

impl std::fmt::Display for TriggerStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerStrategyKind::Cooldown => "cooldown",
            TriggerStrategyKind::NameDiff => "name_diff",
            TriggerStrategyKind::Recency => "recency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub strategy: TriggerStrategyKind,
    pub check_interval_seconds: u64,
    pub cooldown_seconds: u64,
    pub file_age_threshold_minutes: u64,
    pub seen_file_list: String,
    #[serde(default)]
    pub run_once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    /// Spawn an external report job (papermill, the enricher binary, ...)
    Command,
    /// Run the enrichment pipeline inside the watcher process
    Enrichment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub mode: RunnerMode,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub job_spec_path: String,
    pub output_path: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub key_column: String,
    pub key_pattern: String,
    pub account_query: String,
    pub account_key_column: String,
    pub output_prefix: String,
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,
}

fn default_csv_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&Settings::default())?;

        let builder = Config::builder()
            // Start with the compiled-in defaults so partial files are enough
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        let store = &self.document_store;
        if store.site_url.is_empty() {
            return Err("Document store site_url cannot be empty".to_string());
        }
        if store.source_folder.is_empty() {
            return Err("Document store source_folder cannot be empty".to_string());
        }
        if store.destination_folder.is_empty() {
            return Err("Document store destination_folder cannot be empty".to_string());
        }
        if store.backend == StoreBackend::SharePoint && store.username.is_empty() {
            return Err("Document store username is required for SharePoint".to_string());
        }
        if store.token_url.is_some() && store.client_id.is_none() {
            return Err("Document store client_id is required when token_url is set".to_string());
        }
        if store.timeout_seconds == 0 {
            return Err("Document store timeout_seconds must be greater than 0".to_string());
        }

        if self.watcher.check_interval_seconds == 0 {
            return Err("Watcher check_interval_seconds must be greater than 0".to_string());
        }
        if self.watcher.strategy == TriggerStrategyKind::NameDiff
            && self.watcher.seen_file_list.is_empty()
        {
            return Err("Watcher seen_file_list is required for the name_diff strategy".to_string());
        }

        match self.runner.mode {
            RunnerMode::Command => {
                if self.runner.program.is_empty() {
                    return Err("Runner program cannot be empty in command mode".to_string());
                }
            }
            RunnerMode::Enrichment => self.validate_enrichment()?,
        }
        if self.runner.timeout_seconds == 0 {
            return Err("Runner timeout_seconds must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Validate the settings the enrichment pipeline depends on
    pub fn validate_enrichment(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.enrichment.key_column.is_empty() {
            return Err("Enrichment key_column cannot be empty".to_string());
        }
        if self.enrichment.account_key_column.is_empty() {
            return Err("Enrichment account_key_column cannot be empty".to_string());
        }
        if !self.enrichment.account_query.contains("$1") {
            return Err("Enrichment account_query must bind the id list as $1".to_string());
        }
        regex::Regex::new(&self.enrichment.key_pattern)
            .map_err(|e| format!("Enrichment key_pattern is not a valid regex: {}", e))?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            document_store: DocumentStoreConfig {
                backend: StoreBackend::SharePoint,
                site_url: "https://contoso.sharepoint.com/sites/DataInsightsTeam".to_string(),
                source_folder: "/sites/DataInsightsTeam/Shared Documents/CX Automation/FailedSubRedDump"
                    .to_string(),
                destination_folder:
                    "/sites/DataInsightsTeam/Shared Documents/CX Automation/FailedSubRedOutput"
                        .to_string(),
                username: "svc-cx-automation".to_string(),
                password: String::new(),
                token_url: None,
                client_id: None,
                timeout_seconds: 60,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/data_analytics".to_string(),
                max_connections: 5,
                min_connections: 1,
                connect_timeout_seconds: 30,
            },
            watcher: WatcherConfig {
                strategy: TriggerStrategyKind::Cooldown,
                check_interval_seconds: 30,
                cooldown_seconds: 300,
                file_age_threshold_minutes: 5,
                seen_file_list: "saved_file_list.txt".to_string(),
                run_once: false,
            },
            runner: RunnerConfig {
                mode: RunnerMode::Command,
                program: "papermill".to_string(),
                args: vec!["{job}".to_string(), "{output}".to_string()],
                job_spec_path: "SCx_rejection_automation.ipynb".to_string(),
                output_path: "output_notebook.ipynb".to_string(),
                timeout_seconds: 3600,
            },
            enrichment: EnrichmentConfig {
                key_column: "Client Id".to_string(),
                key_pattern: r"^\d".to_string(),
                account_query: "SELECT accountnumber, name, armone_accountname, emailaddress1, telephone1 \
                     FROM new_crm_account WHERE accountnumber = ANY($1)"
                    .to_string(),
                account_key_column: "accountnumber".to_string(),
                output_prefix: "update_".to_string(),
                csv_delimiter: ',',
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: None,
                tracing_endpoint: None,
            },
        }
    }
}
