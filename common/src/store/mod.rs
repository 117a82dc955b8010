// Document store clients
// The watcher only needs folder listings; the enrichment job also downloads
// and uploads through the same trait.

pub mod local;
pub mod sharepoint;

use crate::errors::ConnectivityError;
use crate::models::{FileDescriptor, UploadReceipt};
use async_trait::async_trait;

pub use local::LocalFolderStore;
pub use sharepoint::{SharePointClient, SharePointCredentials};

/// Remote folder of spreadsheet files
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List the files directly inside `folder` (metadata only)
    async fn list_files(&self, folder: &str) -> Result<Vec<FileDescriptor>, ConnectivityError>;

    /// Download a file by the path returned in its descriptor
    async fn download_file(&self, path: &str) -> Result<Vec<u8>, ConnectivityError>;

    /// Upload `data` as `folder/name`, replacing any existing file
    async fn upload_file(
        &self,
        folder: &str,
        name: &str,
        data: &[u8],
    ) -> Result<UploadReceipt, ConnectivityError>;
}

/// Most recently modified file of a listing
pub fn newest_file(files: &[FileDescriptor]) -> Option<&FileDescriptor> {
    files.iter().max_by_key(|f| f.modified_at)
}
