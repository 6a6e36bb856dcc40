//! Startup/shutdown archival sweep.
//!
//! The same idempotent operation runs once before the first consumer
//! iteration (recovering from a prior unclean shutdown) and once on
//! termination, whether that came from a signal or the shutdown phrase.
//! After a sweep, `stage` and `unprocessed` are empty and everything they
//! held is in `archive`. Moves are renames, so a crash mid-sweep leaves a
//! file either at its old path or its new one, never lost.

use std::path::PathBuf;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AudioDirs;
use crate::pipeline::segment::SEGMENT_TS_FORMAT;

/// Errors that can occur during an archival sweep
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a sweep moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// A leftover merged unit was archived from `stage`
    pub stage_archived: bool,

    /// Number of inbox files moved to `archive`
    pub inbox_archived: usize,
}

/// Moves leftover queue files into the archive.
pub struct Archiver {
    dirs: AudioDirs,
}

impl Archiver {
    pub fn new(dirs: AudioDirs) -> Self {
        Self { dirs }
    }

    /// Archive the stage file (if any), then every file in the inbox.
    ///
    /// Idempotent: sweeping empty directories is a no-op.
    pub async fn sweep(&self) -> Result<SweepReport, ArchiveError> {
        let stage_archived = self.archive_stage().await?;
        let inbox_archived = self.archive_unprocessed().await?;

        if stage_archived || inbox_archived > 0 {
            info!(stage_archived, inbox_archived, "archival sweep complete");
        } else {
            debug!("archival sweep: nothing to do");
        }

        Ok(SweepReport {
            stage_archived,
            inbox_archived,
        })
    }

    /// Move a leftover merged unit to `archive/archive_<now>.wav`.
    ///
    /// Merged units carry no capture timestamp of their own, so the
    /// archival name uses the current time.
    async fn archive_stage(&self) -> Result<bool, ArchiveError> {
        let stage_file = self.dirs.stage_file();
        if !stage_file.is_file() {
            return Ok(false);
        }

        let now = Local::now().format(SEGMENT_TS_FORMAT);
        let target = self.dirs.archive().join(format!("archive_{}.wav", now));

        tokio::fs::rename(&stage_file, &target).await?;
        debug!(target = %target.display(), "archived stage file");

        Ok(true)
    }

    /// Move every regular file in the inbox to `archive` under its
    /// original name.
    async fn archive_unprocessed(&self) -> Result<usize, ArchiveError> {
        let mut moved = 0usize;
        let mut entries = tokio::fs::read_dir(self.dirs.unprocessed()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let target = match path.file_name() {
                Some(name) => self.dirs.archive().join(name),
                None => continue,
            };

            tokio::fs::rename(&path, &target).await?;
            moved += 1;
        }

        Ok(moved)
    }

    /// Paths of every file currently in the archive (test/status helper)
    pub async fn archived_files(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(self.dirs.archive()).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_dirs() -> (AudioDirs, TempDir) {
        let temp = TempDir::new().unwrap();
        let dirs = AudioDirs::new(temp.path().join("audio"));
        dirs.ensure().await.unwrap();
        (dirs, temp)
    }

    #[tokio::test]
    async fn test_sweep_empty_is_noop() {
        let (dirs, _temp) = create_dirs().await;
        let archiver = Archiver::new(dirs);

        let report = archiver.sweep().await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(archiver.archived_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_moves_stage_and_inbox() {
        let (dirs, _temp) = create_dirs().await;

        tokio::fs::write(dirs.stage_file(), b"merged").await.unwrap();
        tokio::fs::write(dirs.unprocessed().join("20240101_120000.wav"), b"a")
            .await
            .unwrap();
        tokio::fs::write(dirs.unprocessed().join("20240101_120003.wav"), b"b")
            .await
            .unwrap();

        let archiver = Archiver::new(dirs.clone());
        let report = archiver.sweep().await.unwrap();

        assert!(report.stage_archived);
        assert_eq!(report.inbox_archived, 2);

        // Queue area empty afterwards
        assert!(!dirs.stage_file().exists());
        let mut inbox = tokio::fs::read_dir(dirs.unprocessed()).await.unwrap();
        assert!(inbox.next_entry().await.unwrap().is_none());

        // Inbox files keep their names; the stage file gets an archive_ name
        let archived = archiver.archived_files().await.unwrap();
        assert_eq!(archived.len(), 3);
        assert!(dirs.archive().join("20240101_120000.wav").is_file());
        assert!(dirs.archive().join("20240101_120003.wav").is_file());
        assert!(archived.iter().any(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("archive_") && n.ends_with(".wav"))
                .unwrap_or(false)
        }));
    }

    #[tokio::test]
    async fn test_sweep_twice_moves_exactly_once() {
        let (dirs, _temp) = create_dirs().await;

        tokio::fs::write(dirs.unprocessed().join("20240101_120000.wav"), b"a")
            .await
            .unwrap();

        let archiver = Archiver::new(dirs);
        let first = archiver.sweep().await.unwrap();
        let second = archiver.sweep().await.unwrap();

        assert_eq!(first.inbox_archived, 1);
        assert_eq!(second, SweepReport::default());
        assert_eq!(archiver.archived_files().await.unwrap().len(), 1);
    }
}
