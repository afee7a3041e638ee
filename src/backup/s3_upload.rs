// dbbackup/src/backup/s3_upload.rs
use std::fs;

use super::archive::CompressedArtifact;
use crate::errors::{BackupError, Result};
use crate::storage::{object_key, ObjectStore};

/// Uploads the archive as a private object at `<root>/<name>` and removes the
/// local file once the store has confirmed the write. Returns the object key.
pub async fn upload_artifact(
    store: &dyn ObjectStore,
    artifact: CompressedArtifact,
    root_folder: &str,
) -> Result<String> {
    let key = object_key(root_folder, &artifact.name);
    tracing::info!(
        file = %artifact.path.display(),
        key = %key,
        size_bytes = artifact.size,
        "Transferring the backup file to object storage"
    );

    store
        .put_object(&key, &artifact.path)
        .await
        .map_err(|e| BackupError::UploadFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    fs::remove_file(&artifact.path)?;

    tracing::info!(key = %key, "{} has been uploaded to object storage", artifact.name);
    Ok(key)
}
