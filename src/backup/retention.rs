// dbbackup/src/backup/retention.rs
//! Retention sweep over previously uploaded backups.
//!
//! Objects move through three states: active, pending deletion (parked under
//! `<root>/toDelete/`) and deleted. An active object older than the threshold
//! is parked; anything already parked is deleted on the next sweep, which gives
//! a grace window of one full run between the two transitions.

use chrono::NaiveDate;
use std::path::Path;

use crate::errors::{BackupError, Result};
use crate::storage::{object_key, ObjectStore, RemoteObject, StorageError};

pub const PENDING_DELETION_FOLDER: &str = "toDelete";

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub root_folder: String,
    /// Objects strictly older than this many days are parked.
    pub threshold_days: i64,
}

impl RetentionPolicy {
    pub fn new(root_folder: &str, threshold_days: i64) -> Self {
        RetentionPolicy {
            root_folder: root_folder.trim_end_matches('/').to_string(),
            threshold_days,
        }
    }

    /// `<root>/toDelete/`, or `toDelete/` without a root folder.
    pub fn pending_prefix(&self) -> String {
        object_key(&self.root_folder, &format!("{}/", PENDING_DELETION_FOLDER))
    }

    pub fn pending_key(&self, basename: &str) -> String {
        format!("{}{}", self.pending_prefix(), basename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionAction {
    /// Already pending deletion: remove it from the store.
    Purge,
    /// Expired: move it under the pending-deletion folder.
    MarkForDeletion { destination: String },
    Keep,
}

/// Decides what happens to one listed object. Age is counted in whole
/// calendar days, ignoring the time of day.
pub fn classify(object: &RemoteObject, policy: &RetentionPolicy, today: NaiveDate) -> RetentionAction {
    if object.key.starts_with(&policy.pending_prefix()) {
        return RetentionAction::Purge;
    }

    // Folder placeholders have no basename to park under.
    if object.key.ends_with('/') {
        return RetentionAction::Keep;
    }

    let age_days = (today - object.last_modified.date_naive()).num_days();
    if age_days > policy.threshold_days {
        RetentionAction::MarkForDeletion {
            destination: policy.pending_key(object.basename()),
        }
    } else {
        RetentionAction::Keep
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub purged: Vec<String>,
    pub marked: Vec<String>,
    pub kept: usize,
}

fn transition_failed(key: &str) -> impl Fn(StorageError) -> BackupError + '_ {
    move |e| BackupError::RetentionTransitionFailed {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

fn local_copy_failed(key: &str) -> impl Fn(std::io::Error) -> BackupError + '_ {
    move |e| BackupError::RetentionTransitionFailed {
        key: key.to_string(),
        reason: format!("local copy: {}", e),
    }
}

/// Applies the retention state machine to every object in the store, in
/// listing order. The first failing transition aborts the sweep.
pub async fn sweep(
    store: &dyn ObjectStore,
    policy: &RetentionPolicy,
    today: NaiveDate,
    scratch_dir: &Path,
) -> Result<SweepReport> {
    tracing::info!(
        threshold_days = policy.threshold_days,
        "Checking if there is any backup file older than the retention threshold"
    );

    let objects = store
        .list_objects()
        .await
        .map_err(|e| BackupError::RetentionListingFailed(e.to_string()))?;

    let mut report = SweepReport::default();
    for object in &objects {
        match classify(object, policy, today) {
            RetentionAction::Purge => {
                tracing::info!(key = %object.key, "Deleting backup pending deletion");
                store
                    .delete_object(&object.key)
                    .await
                    .map_err(transition_failed(&object.key))?;
                report.purged.push(object.key.clone());
            }
            RetentionAction::MarkForDeletion { destination } => {
                tracing::info!(
                    key = %object.key,
                    destination = %destination,
                    threshold_days = policy.threshold_days,
                    "Backup is older than the retention threshold, moving it to the toDelete folder"
                );
                mark_for_deletion(store, object, &destination, scratch_dir).await?;
                report.marked.push(object.key.clone());
            }
            RetentionAction::Keep => {
                tracing::debug!(key = %object.key, size_bytes = object.size, "Keeping backup");
                report.kept += 1;
            }
        }
    }

    tracing::info!(
        purged = report.purged.len(),
        marked = report.marked.len(),
        kept = report.kept,
        "Retention sweep finished"
    );
    Ok(report)
}

/// Moves one object by download, private re-upload, delete. The local copy
/// lives in `scratch_dir` only until the re-upload attempt returns.
async fn mark_for_deletion(
    store: &dyn ObjectStore,
    object: &RemoteObject,
    destination: &str,
    scratch_dir: &Path,
) -> Result<()> {
    let key = object.key.as_str();
    let local_copy = tempfile::Builder::new()
        .prefix("retention-")
        .tempfile_in(scratch_dir)
        .map_err(local_copy_failed(key))?;

    let downloaded = store
        .get_object(key, local_copy.path())
        .await
        .map_err(transition_failed(key))?;
    tracing::debug!(key = %key, size_bytes = downloaded, "Downloaded backup for the move");

    let uploaded = store.put_object(destination, local_copy.path()).await;
    drop(local_copy);
    uploaded.map_err(transition_failed(key))?;

    store.delete_object(key).await.map_err(transition_failed(key))
}
