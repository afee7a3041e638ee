//! Object store abstraction
//!
//! The backup pipeline only needs four primitives from the remote artifact
//! store: list, put (private), get and delete. `SpacesStore` implements them
//! over any S3-compatible endpoint; tests use the in-memory store.

pub mod s3;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl RemoteObject {
    /// Last path segment of the key.
    pub fn basename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object in the configured bucket, in listing order.
    async fn list_objects(&self) -> StorageResult<Vec<RemoteObject>>;

    /// Streams the file at `source` to `key` with a private ACL.
    async fn put_object(&self, key: &str, source: &Path) -> StorageResult<()>;

    /// Streams the object at `key` into `destination`, returning the bytes written.
    async fn get_object(&self, key: &str, destination: &Path) -> StorageResult<u64>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;
}

/// Joins the configured root folder and a relative key.
pub fn object_key(root_folder: &str, relative: &str) -> String {
    let root = root_folder.trim_end_matches('/');
    if root.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", root, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("", "dbBackup-1.zip"), "dbBackup-1.zip");
        assert_eq!(object_key("root", "dbBackup-1.zip"), "root/dbBackup-1.zip");
        assert_eq!(object_key("root/", "toDelete/a.zip"), "root/toDelete/a.zip");
    }

    #[test]
    fn test_basename() {
        let object = RemoteObject {
            key: "root/nested/2024.zip".into(),
            last_modified: Utc::now(),
            size: 1,
        };
        assert_eq!(object.basename(), "2024.zip");
    }
}
