use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Document Store Models
// ============================================================================

/// Metadata snapshot of one file in a watched folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    /// Server-relative path used to download the file
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
}

impl FileDescriptor {
    /// True if the file was created or modified strictly after `cutoff`
    pub fn touched_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at > cutoff || self.modified_at > cutoff
    }
}

/// Confirmation returned by an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub path: String,
    pub size: u64,
}

// ============================================================================
// Report Job Models
// ============================================================================

/// One invocation of the report job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: Uuid,
    pub spec_path: PathBuf,
    pub output_path: PathBuf,
    /// Names of the files that caused this run
    pub detected: Vec<String>,
}

impl ReportJob {
    pub fn new(
        spec_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        detected: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec_path: spec_path.into(),
            output_path: output_path.into(),
            detected,
        }
    }
}

/// Result of a successful report job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub output: serde_json::Value,
}
