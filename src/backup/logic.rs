// dbbackup/src/backup/logic.rs
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::fs;
use std::path::PathBuf;

use super::archive::{pack_dump, CompressedArtifact};
use super::db_dump::{produce_dump, DumpArtifact, ExportTool};
use super::retention::{sweep, RetentionPolicy};
use super::s3_upload::upload_artifact;
use super::targets::{resolve_targets, DatabaseCatalogue, TargetRequest, TargetSelection};
use crate::errors::{BackupError, Result};
use crate::notify::Notifier;
use crate::storage::ObjectStore;

/// Final verdict of one invocation, handed to the notifier exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub message: String,
}

impl RunOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        RunOutcome {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        RunOutcome {
            success: false,
            message: message.into(),
        }
    }
}

/// Pipeline states. Each non-terminal state owns what the previous stage produced.
#[derive(Debug)]
pub enum RunStage {
    Init,
    ResolveTargets,
    Dump(TargetSelection),
    Pack(DumpArtifact),
    Sweep(CompressedArtifact),
    Upload(CompressedArtifact),
    Success { file_name: String },
    Failed { stage: &'static str, error: BackupError },
}

impl RunStage {
    pub fn name(&self) -> &'static str {
        match self {
            RunStage::Init => "init",
            RunStage::ResolveTargets => "resolve-targets",
            RunStage::Dump(_) => "dump",
            RunStage::Pack(_) => "pack",
            RunStage::Sweep(_) => "sweep",
            RunStage::Upload(_) => "upload",
            RunStage::Success { .. } => "success",
            RunStage::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Success { .. } | RunStage::Failed { .. })
    }
}

/// Wall clock readings taken once per run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    /// Local time used for artifact names.
    pub started_at: DateTime<Local>,
    /// Calendar day retention ages are measured against.
    pub today: NaiveDate,
}

impl RunClock {
    pub fn now() -> Self {
        RunClock {
            started_at: Local::now(),
            today: Utc::now().date_naive(),
        }
    }
}

pub struct BackupRun<'a> {
    pub request: TargetRequest,
    pub catalogue: &'a dyn DatabaseCatalogue,
    pub exporter: &'a dyn ExportTool,
    pub store: &'a dyn ObjectStore,
    pub notifier: &'a dyn Notifier,
    pub retention: RetentionPolicy,
    pub root_folder: String,
    pub work_dir: PathBuf,
    pub clock: RunClock,
}

fn then<T>(stage: &'static str, result: Result<T>, next: impl FnOnce(T) -> RunStage) -> RunStage {
    match result {
        Ok(value) => next(value),
        Err(error) => RunStage::Failed { stage, error },
    }
}

impl BackupRun<'_> {
    /// Drives the pipeline to a terminal state, reports it, and returns the outcome.
    pub async fn execute(&self) -> RunOutcome {
        let mut stage = RunStage::Init;
        while !stage.is_terminal() {
            tracing::debug!(stage = stage.name(), "Entering stage");
            stage = self.advance(stage).await;
        }

        let outcome = match stage {
            RunStage::Success { file_name } => RunOutcome::success(format!(
                "Backup has been successfully taken, file name: {}",
                file_name
            )),
            RunStage::Failed { stage, error } => {
                tracing::debug!(stage, "Run stopped");
                RunOutcome::failure(error.to_string())
            }
            other => RunOutcome::failure(format!("Run stopped in stage {}", other.name())),
        };

        report_outcome(self.notifier, &outcome).await;
        outcome
    }

    async fn advance(&self, stage: RunStage) -> RunStage {
        match stage {
            RunStage::Init => then(
                "init",
                fs::create_dir_all(&self.work_dir).map_err(BackupError::from),
                |_| RunStage::ResolveTargets,
            ),
            RunStage::ResolveTargets => then(
                "resolve-targets",
                resolve_targets(&self.request, self.catalogue).await,
                RunStage::Dump,
            ),
            RunStage::Dump(selection) => then(
                "dump",
                produce_dump(self.exporter, &selection, &self.work_dir, self.clock.started_at),
                RunStage::Pack,
            ),
            RunStage::Pack(dump) => then("pack", pack_dump(dump), RunStage::Sweep),
            RunStage::Sweep(archive) => then(
                "sweep",
                sweep(self.store, &self.retention, self.clock.today, &self.work_dir).await,
                |_| RunStage::Upload(archive),
            ),
            RunStage::Upload(archive) => {
                let file_name = archive.name.clone();
                then(
                    "upload",
                    upload_artifact(self.store, archive, &self.root_folder).await,
                    |_| RunStage::Success { file_name },
                )
            }
            terminal => terminal,
        }
    }
}

/// Logs the outcome and hands it to the notifier. A notifier failure is logged
/// and never changes the outcome.
pub async fn report_outcome(notifier: &dyn Notifier, outcome: &RunOutcome) {
    if outcome.success {
        tracing::info!("{}", outcome.message);
    } else {
        tracing::error!("{}", outcome.message);
    }

    if let Err(e) = notifier.send(outcome).await {
        tracing::error!(error = %e, "Unable to deliver run notification");
    }
}
