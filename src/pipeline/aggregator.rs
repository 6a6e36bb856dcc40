//! Segment aggregation: merge the pending batch, archive the originals.
//!
//! One iteration takes everything in the inbox at the moment of listing,
//! oldest first, concatenates the sample frames into a single merged WAV
//! in `stage`, then renames each consumed segment into `archive`. The
//! merged file is written under a temp name and renamed into place, so
//! the stage path is always either the previous merged unit or the new
//! one, never a partial write.
//!
//! The read of a batch and the archival of its sources are not one
//! transaction: a crash in between leaves the sources still in the inbox,
//! where the startup sweep recovers them.

use std::path::PathBuf;

use hound::{WavReader, WavSpec, WavWriter};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AudioDirs;
use crate::pipeline::segment::Segment;

/// Errors that can occur while merging a batch
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("audio format mismatch in {file}: expected {expected:?}, found {found:?}")]
    FormatMismatch {
        file: String,
        expected: WavSpec,
        found: WavSpec,
    },

    #[error("WAV error in {file}: {source}")]
    Wav {
        file: String,
        #[source]
        source: hound::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for one merged batch
#[derive(Debug, Clone)]
pub struct MergedBatch {
    /// Path of the merged unit in `stage`
    pub path: PathBuf,

    /// Number of segments merged
    pub segments: usize,

    /// Oldest segment file name in the batch
    pub oldest: String,

    /// Latest segment file name in the batch
    pub latest: String,
}

/// Builds merged units from pending inbox segments.
pub struct Aggregator {
    dirs: AudioDirs,
}

impl Aggregator {
    pub fn new(dirs: AudioDirs) -> Self {
        Self { dirs }
    }

    /// Snapshot the inbox: finished segments only, oldest first.
    ///
    /// A segment the producer renames into place mid-listing is either
    /// included here or picked up next iteration; partial writes use
    /// hidden temp names and are filtered out by [`Segment::from_path`].
    pub async fn list_pending(&self) -> Result<Vec<Segment>, MergeError> {
        let mut pending = Vec::new();
        let mut entries = tokio::fs::read_dir(self.dirs.unprocessed()).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(segment) = Segment::from_path(&entry.path()) {
                pending.push(segment);
            }
        }

        pending.sort();
        Ok(pending)
    }

    /// Run one aggregation iteration.
    ///
    /// Returns None when the inbox is empty (the caller owns the backoff).
    /// Otherwise writes the merged unit to `stage` and archives every
    /// consumed segment, returning the batch metadata.
    pub async fn merge_once(&self) -> Result<Option<MergedBatch>, MergeError> {
        let pending = self.list_pending().await?;
        if pending.is_empty() {
            return Ok(None);
        }

        debug!(segments = pending.len(), "generating merged chunk");
        self.write_merged(&pending)?;
        self.archive_consumed(&pending).await?;

        let batch = MergedBatch {
            path: self.dirs.stage_file(),
            segments: pending.len(),
            // list_pending sorts, so first/last bound the batch
            oldest: pending[0].file_name.clone(),
            latest: pending[pending.len() - 1].file_name.clone(),
        };

        info!(
            segments = batch.segments,
            oldest = %batch.oldest,
            latest = %batch.latest,
            "merged chunk staged"
        );

        Ok(Some(batch))
    }

    /// Concatenate the batch's frames into the stage file.
    ///
    /// The WAV spec comes from the first segment; every later segment must
    /// match it exactly. A mismatch is a data error, not something to
    /// splice into the merged unit.
    fn write_merged(&self, pending: &[Segment]) -> Result<(), MergeError> {
        let mut spec: Option<WavSpec> = None;
        let mut samples: Vec<i16> = Vec::new();

        for segment in pending {
            let mut reader = WavReader::open(&segment.path).map_err(|source| MergeError::Wav {
                file: segment.file_name.clone(),
                source,
            })?;

            let file_spec = reader.spec();
            match spec {
                None => spec = Some(file_spec),
                Some(expected) if expected != file_spec => {
                    return Err(MergeError::FormatMismatch {
                        file: segment.file_name.clone(),
                        expected,
                        found: file_spec,
                    });
                }
                Some(_) => {}
            }

            for sample in reader.samples::<i16>() {
                samples.push(sample.map_err(|source| MergeError::Wav {
                    file: segment.file_name.clone(),
                    source,
                })?);
            }
        }

        let spec = match spec {
            Some(spec) => spec,
            // pending is non-empty, so the loop always set a spec
            None => return Ok(()),
        };

        let stage_file = self.dirs.stage_file();
        let tmp = self.dirs.stage().join(".sounds.wav.tmp");

        let mut writer = WavWriter::create(&tmp, spec).map_err(|source| MergeError::Wav {
            file: tmp.display().to_string(),
            source,
        })?;
        for sample in samples {
            writer.write_sample(sample).map_err(|source| MergeError::Wav {
                file: tmp.display().to_string(),
                source,
            })?;
        }
        writer.finalize().map_err(|source| MergeError::Wav {
            file: tmp.display().to_string(),
            source,
        })?;

        std::fs::rename(&tmp, &stage_file)?;
        Ok(())
    }

    /// Rename every consumed segment into the archive, name unchanged.
    async fn archive_consumed(&self, pending: &[Segment]) -> Result<(), MergeError> {
        for segment in pending {
            let target = self.dirs.archive().join(&segment.file_name);
            tokio::fs::rename(&segment.path, &target).await?;
        }
        Ok(())
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

    fn test_spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn write_wav(path: &std::path::Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn read_samples(path: &std::path::Path) -> Vec<i16> {
        WavReader::open(path)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_empty_inbox_returns_none() {
        let (dirs, _temp) = create_dirs().await;
        let aggregator = Aggregator::new(dirs.clone());

        assert!(aggregator.merge_once().await.unwrap().is_none());

        // No filesystem mutation on an empty poll
        assert!(!dirs.stage_file().exists());
        let mut archive = tokio::fs::read_dir(dirs.archive()).await.unwrap();
        assert!(archive.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_concatenates_in_timestamp_order() {
        let (dirs, _temp) = create_dirs().await;
        let spec = test_spec();

        // Written out of order on purpose; merge must sort by name
        write_wav(&dirs.unprocessed().join("20240101_120003.wav"), spec, &[4, 5, 6]);
        write_wav(&dirs.unprocessed().join("20240101_120000.wav"), spec, &[1, 2, 3]);
        write_wav(&dirs.unprocessed().join("20240101_120006.wav"), spec, &[7, 8, 9]);

        let aggregator = Aggregator::new(dirs.clone());
        let batch = aggregator.merge_once().await.unwrap().unwrap();

        assert_eq!(batch.segments, 3);
        assert_eq!(batch.oldest, "20240101_120000.wav");
        assert_eq!(batch.latest, "20240101_120006.wav");

        assert_eq!(
            read_samples(&dirs.stage_file()),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9]
        );

        // All consumed segments archived under their original names
        for name in [
            "20240101_120000.wav",
            "20240101_120003.wav",
            "20240101_120006.wav",
        ] {
            assert!(!dirs.unprocessed().join(name).exists());
            assert!(dirs.archive().join(name).is_file());
        }
    }

    #[tokio::test]
    async fn test_merge_rejects_format_mismatch() {
        let (dirs, _temp) = create_dirs().await;
        let spec = test_spec();
        let other = WavSpec {
            sample_rate: 16_000,
            ..spec
        };

        write_wav(&dirs.unprocessed().join("20240101_120000.wav"), spec, &[1]);
        write_wav(&dirs.unprocessed().join("20240101_120003.wav"), other, &[2]);

        let aggregator = Aggregator::new(dirs.clone());
        let err = aggregator.merge_once().await.unwrap_err();

        assert!(matches!(err, MergeError::FormatMismatch { .. }));
        // Nothing staged, nothing archived
        assert!(!dirs.stage_file().exists());
        assert!(dirs.unprocessed().join("20240101_120000.wav").is_file());
    }

    #[tokio::test]
    async fn test_pending_skips_foreign_and_partial_files() {
        let (dirs, _temp) = create_dirs().await;
        let spec = test_spec();

        write_wav(&dirs.unprocessed().join("20240101_120000.wav"), spec, &[1]);
        tokio::fs::write(dirs.unprocessed().join(".20240101_120003.wav.partial"), b"x")
            .await
            .unwrap();
        tokio::fs::write(dirs.unprocessed().join("notes.txt"), b"x")
            .await
            .unwrap();

        let aggregator = Aggregator::new(dirs);
        let pending = aggregator.list_pending().await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_name, "20240101_120000.wav");
    }

    #[tokio::test]
    async fn test_merge_replaces_previous_stage_file() {
        let (dirs, _temp) = create_dirs().await;
        let spec = test_spec();

        write_wav(&dirs.unprocessed().join("20240101_120000.wav"), spec, &[1, 2]);
        let aggregator = Aggregator::new(dirs.clone());
        aggregator.merge_once().await.unwrap().unwrap();
        assert_eq!(read_samples(&dirs.stage_file()), vec![1, 2]);

        write_wav(&dirs.unprocessed().join("20240101_120003.wav"), spec, &[3, 4]);
        aggregator.merge_once().await.unwrap().unwrap();
        assert_eq!(read_samples(&dirs.stage_file()), vec![3, 4]);
    }
}
