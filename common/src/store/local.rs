// Local directory implementation of the document store

use crate::errors::ConnectivityError;
use crate::models::{FileDescriptor, UploadReceipt};
use crate::store::DocumentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Document store backed by a directory on disk
///
/// Folder and file paths are resolved relative to `root`, so the same
/// server-relative paths used with SharePoint work here.
#[derive(Debug, Clone)]
pub struct LocalFolderStore {
    root: PathBuf,
}

impl LocalFolderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn fs_error(path: &Path, err: std::io::Error) -> ConnectivityError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ConnectivityError::NotFound(path.display().to_string())
    } else {
        ConnectivityError::FileSystem {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

fn join_folder(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name)
}

#[async_trait]
impl DocumentStore for LocalFolderStore {
    #[instrument(skip(self))]
    async fn list_files(&self, folder: &str) -> Result<Vec<FileDescriptor>, ConnectivityError> {
        let dir = self.resolve(folder);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| fs_error(&dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| fs_error(&dir, e))? {
            let metadata = entry.metadata().await.map_err(|e| fs_error(&entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }

            let modified: DateTime<Utc> = metadata
                .modified()
                .map_err(|e| fs_error(&entry.path(), e))?
                .into();
            // Not every filesystem records creation time
            let created: DateTime<Utc> = metadata.created().map(Into::into).unwrap_or(modified);
            let name = entry.file_name().to_string_lossy().into_owned();

            files.push(FileDescriptor {
                path: join_folder(folder, &name),
                name,
                created_at: created,
                modified_at: modified,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(file_count = files.len(), "Listed local folder");
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn download_file(&self, path: &str) -> Result<Vec<u8>, ConnectivityError> {
        let file = self.resolve(path);
        tokio::fs::read(&file).await.map_err(|e| fs_error(&file, e))
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_file(
        &self,
        folder: &str,
        name: &str,
        data: &[u8],
    ) -> Result<UploadReceipt, ConnectivityError> {
        let dir = self.resolve(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| fs_error(&dir, e))?;

        let file = dir.join(name);
        tokio::fs::write(&file, data)
            .await
            .map_err(|e| fs_error(&file, e))?;

        Ok(UploadReceipt {
            path: join_folder(folder, name),
            size: data.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_list_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());

        let receipt = store
            .upload_file("/Shared/Out", "report.xlsx", b"bytes")
            .await
            .unwrap();
        assert_eq!(receipt.path, "/Shared/Out/report.xlsx");
        assert_eq!(receipt.size, 5);

        let files = store.list_files("/Shared/Out").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report.xlsx");
        assert_eq!(files[0].size, 5);

        let data = store.download_file(&files[0].path).await.unwrap();
        assert_eq!(data, b"bytes");
    }

    #[tokio::test]
    async fn test_list_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dump/archive")).unwrap();
        std::fs::write(dir.path().join("dump/a.xlsx"), b"a").unwrap();

        let store = LocalFolderStore::new(dir.path());
        let files = store.list_files("dump").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "dump/a.xlsx");
    }

    #[tokio::test]
    async fn test_missing_folder_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());
        let err = store.list_files("missing").await.unwrap_err();
        assert!(matches!(err, ConnectivityError::NotFound(_)));
    }
}
