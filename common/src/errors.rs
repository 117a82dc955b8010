// Error handling framework
// One enum per collaborator boundary; the trigger loop decides the policy.

use thiserror::Error;

/// Document store errors (listing, download, upload)
#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Request to {url} returned status {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Filesystem error on {path}: {reason}")]
    FileSystem { path: String, reason: String },
}

impl ConnectivityError {
    /// True when the store rejected our credentials
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ConnectivityError::AuthenticationFailed(_)
                | ConnectivityError::UnexpectedStatus { status: 401, .. }
        )
    }
}

/// Report job errors
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to start report job '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Report job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Report job exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("Document store error: {0}")]
    Store(#[from] ConnectivityError),

    #[error("Account lookup failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Table processing failed: {0}")]
    Table(#[from] TableError),
}

/// Seen-file list persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read seen-file list {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to write seen-file list {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),
}

/// Spreadsheet parsing and table manipulation errors
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to parse spreadsheet: {0}")]
    ParseFailed(String),

    #[error("Spreadsheet has no worksheets")]
    NoWorksheet,

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write spreadsheet: {0}")]
    WriteFailed(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DatabaseError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<calamine::Error> for TableError {
    fn from(err: calamine::Error) -> Self {
        TableError::ParseFailed(err.to_string())
    }
}

impl From<csv::Error> for TableError {
    fn from(err: csv::Error) -> Self {
        TableError::ParseFailed(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for TableError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        TableError::WriteFailed(err.to_string())
    }
}
