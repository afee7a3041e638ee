// dbbackup/src/backup/db_dump.rs
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use which::which;

use super::targets::TargetSelection;
use crate::config::DatabaseConfig;
use crate::errors::{BackupError, Result};

pub const DUMP_FILE_PREFIX: &str = "dbBackup-";

/// Raw export on local disk.
#[derive(Debug, Clone)]
pub struct DumpArtifact {
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Local>,
}

/// A fully parameterised external command. `secret` is masked whenever the
/// command is rendered for logging.
#[derive(Clone)]
pub struct ExportCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub secret: Option<String>,
}

impl ExportCommand {
    pub fn redacted(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        match &self.secret {
            Some(secret) => redact(&rendered, secret),
            None => rendered,
        }
    }
}

/// Masks every occurrence of `secret` in `text`.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        text.to_string()
    } else {
        text.replace(secret, "***")
    }
}

/// Builds the export command for a target selection.
pub trait ExportTool: Send + Sync {
    fn command(&self, selection: &TargetSelection) -> Result<ExportCommand>;
}

pub struct MysqlDump {
    database: DatabaseConfig,
    program: Option<PathBuf>,
}

impl MysqlDump {
    pub fn new(database: &DatabaseConfig, program: Option<PathBuf>) -> Self {
        MysqlDump {
            database: database.clone(),
            program,
        }
    }

    fn executable(&self) -> Result<PathBuf> {
        match &self.program {
            Some(path) => Ok(path.clone()),
            None => which("mysqldump").map_err(|_| {
                BackupError::ExportCommandFailed(
                    "mysqldump executable not found in PATH. Please ensure MySQL client tools are installed."
                        .into(),
                )
            }),
        }
    }
}

impl ExportTool for MysqlDump {
    fn command(&self, selection: &TargetSelection) -> Result<ExportCommand> {
        let mut args = vec![
            "-h".to_string(),
            self.database.host.clone(),
            "-P".to_string(),
            self.database.port.to_string(),
            "-u".to_string(),
            self.database.username.clone(),
        ];
        if !self.database.password.is_empty() {
            args.push(format!("--password={}", self.database.password));
        }

        match selection {
            TargetSelection::Everything => args.push("--all-databases".to_string()),
            TargetSelection::Databases(names) => {
                args.push("--databases".to_string());
                args.extend(names.iter().cloned());
            }
        }

        Ok(ExportCommand {
            program: self.executable()?,
            args,
            secret: Some(self.database.password.clone()),
        })
    }
}

pub fn dump_file_name(now: &DateTime<Local>) -> String {
    format!("{}{}.sql", DUMP_FILE_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Runs the export tool with stdout redirected into `work_dir/dbBackup-<stamp>.sql`.
pub fn produce_dump(
    tool: &dyn ExportTool,
    selection: &TargetSelection,
    work_dir: &Path,
    now: DateTime<Local>,
) -> Result<DumpArtifact> {
    let command = tool.command(selection)?;
    let dump_path = work_dir.join(dump_file_name(&now));

    tracing::info!(file = %dump_path.display(), "Running mysqldump command");
    tracing::debug!(command = %command.redacted(), "mysqldump command");

    let output_file = File::create(&dump_path)?;
    let output = Command::new(&command.program)
        .args(&command.args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(output_file))
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            BackupError::ExportCommandFailed(format!(
                "unable to run {}: {}",
                command.program.display(),
                e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        let message = match &command.secret {
            Some(secret) => redact(&message, secret),
            None => message,
        };
        return Err(BackupError::ExportCommandFailed(message));
    }

    if !dump_path.is_file() {
        return Err(BackupError::OutputFileMissing(dump_path));
    }
    let size = fs::metadata(&dump_path)?.len();
    if size == 0 {
        return Err(BackupError::OutputFileEmpty(dump_path));
    }

    tracing::info!(file = %dump_path.display(), size_bytes = size, "Dump created");
    Ok(DumpArtifact {
        path: dump_path,
        size,
        created_at: now,
    })
}
