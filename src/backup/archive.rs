// dbbackup/src/backup/archive.rs
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::db_dump::DumpArtifact;
use crate::errors::{BackupError, Result};

/// Deflate-compressed archive holding exactly one dump.
#[derive(Debug, Clone)]
pub struct CompressedArtifact {
    pub path: PathBuf,
    pub size: u64,
    /// File name, `dbBackup-YYYYMMDD_HHMMSS.zip`.
    pub name: String,
}

fn zip_error(e: zip::result::ZipError) -> BackupError {
    match e {
        zip::result::ZipError::Io(io_err) => BackupError::Io(io_err),
        other => BackupError::Io(io::Error::other(other)),
    }
}

/// Compresses the dump next to itself and removes the dump once the archive
/// is verified. On failure the dump is left in place.
pub fn pack_dump(dump: DumpArtifact) -> Result<CompressedArtifact> {
    let archive_path = dump.path.with_extension("zip");
    let entry_name = dump
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::OutputFileMissing(dump.path.clone()))?;

    tracing::info!(
        source = %dump.path.display(),
        source_bytes = dump.size,
        dumped_at = %dump.created_at.format("%Y-%m-%d %H:%M:%S"),
        archive = %archive_path.display(),
        "Compressing the backup file"
    );

    let mut zip = ZipWriter::new(File::create(&archive_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    zip.start_file(entry_name, options).map_err(zip_error)?;

    let mut source = File::open(&dump.path)?;
    io::copy(&mut source, &mut zip)?;
    zip.finish().map_err(zip_error)?;

    if !archive_path.is_file() {
        return Err(BackupError::ArchiveMissing(archive_path));
    }
    let size = fs::metadata(&archive_path)?.len();
    if size == 0 {
        return Err(BackupError::ArchiveEmpty(archive_path));
    }

    fs::remove_file(&dump.path)?;

    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::ArchiveMissing(archive_path.clone()))?;

    tracing::info!(archive = %archive_path.display(), size_bytes = size, "Backup file compressed");
    Ok(CompressedArtifact {
        path: archive_path,
        size,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::io::Read;

    fn write_dump(dir: &std::path::Path, body: &str) -> Result<DumpArtifact> {
        let path = dir.join("dbBackup-20240102_030405.sql");
        fs::write(&path, body)?;
        Ok(DumpArtifact {
            size: body.len() as u64,
            path,
            created_at: Local::now(),
        })
    }

    #[test]
    fn test_pack_replaces_dump_with_archive() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let body = "INSERT INTO t VALUES (1);\n".repeat(200);
        let dump = write_dump(dir.path(), &body)?;
        let dump_path = dump.path.clone();

        let archive = pack_dump(dump)?;

        assert_eq!(archive.name, "dbBackup-20240102_030405.zip");
        assert!(archive.size > 0);
        assert!(archive.path.is_file());
        assert!(!dump_path.exists());

        let mut zip = zip::ZipArchive::new(File::open(&archive.path)?).map_err(zip_error)?;
        assert_eq!(zip.len(), 1);
        let mut entry = zip.by_index(0).map_err(zip_error)?;
        assert_eq!(entry.name(), "dbBackup-20240102_030405.sql");
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut restored = String::new();
        entry.read_to_string(&mut restored)?;
        assert_eq!(restored, body);
        Ok(())
    }

    #[test]
    fn test_failed_pack_keeps_dump() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = write_dump(dir.path(), "SELECT 1;\n")?;
        let dump_path = dump.path.clone();
        // A directory where the archive should go makes creation fail.
        fs::create_dir(dir.path().join("dbBackup-20240102_030405.zip"))?;

        assert!(pack_dump(dump).is_err());
        assert!(dump_path.is_file());
        Ok(())
    }
}
