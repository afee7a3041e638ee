use std::path::PathBuf;
use thiserror::Error;

/// Every way a backup run can fail. All variants are terminal to the run.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    ConfigurationInvalid(String),

    #[error("Unable to connect to MySQL: {0}")]
    ConnectionFailed(String),

    #[error("There are no databases to take backup of")]
    NoTargetsAvailable,

    #[error("Following databases are not found in MySQL: {}", .0.join(", "))]
    UnknownTargets(Vec<String>),

    #[error("Error when running mysqldump command: {0}")]
    ExportCommandFailed(String),

    #[error("{} not created", .0.display())]
    OutputFileMissing(PathBuf),

    #[error("{} size is zero", .0.display())]
    OutputFileEmpty(PathBuf),

    #[error("Archive {} not created", .0.display())]
    ArchiveMissing(PathBuf),

    #[error("Archive {} size is zero", .0.display())]
    ArchiveEmpty(PathBuf),

    #[error("Unable to list backups in the object store: {0}")]
    RetentionListingFailed(String),

    #[error("Retention transition failed for {key}: {reason}")]
    RetentionTransitionFailed { key: String, reason: String },

    #[error("Upload of {key} failed: {reason}")]
    UploadFailed { key: String, reason: String },

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
