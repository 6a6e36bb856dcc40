//! Transcript log and control-phrase detection.
//!
//! The transcript is an append-only text file, one line per processed
//! batch, named from an optional run label plus the process start time.
//! Each append is open-append-close, so a failed write can never corrupt
//! prior lines. Control phrases are literal case-insensitive substrings
//! checked independently per batch.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Timestamp format used in transcript file names (minute resolution)
pub const TRANSCRIPT_TS_FORMAT: &str = "%y%m%d_%H%M";

/// Which control phrases a batch of transcribed text contained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhraseHits {
    /// The activation phrase was present
    pub activation: bool,

    /// The shutdown phrase was present
    pub shutdown: bool,
}

/// The two control phrases, matched case-insensitively.
///
/// Detection is stateless and per-batch; both phrases may hit on the
/// same batch and each triggers its own side effect.
#[derive(Debug, Clone)]
pub struct ControlPhrases {
    activation: String,
    shutdown: String,
}

impl ControlPhrases {
    pub fn new(activation: &str, shutdown: &str) -> Self {
        Self {
            activation: activation.to_lowercase(),
            shutdown: shutdown.to_lowercase(),
        }
    }

    /// Scan one batch of transcribed text for both phrases
    pub fn detect(&self, text: &str) -> PhraseHits {
        let lowered = text.to_lowercase();
        PhraseHits {
            activation: lowered.contains(&self.activation),
            shutdown: lowered.contains(&self.shutdown),
        }
    }
}

/// Append-only transcript file for one run.
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    /// Transcript file name for a run: `<label><startYYMMDD_HHMM>.txt`,
    /// or just the timestamp when no label is given.
    pub fn file_name(label: Option<&str>, started_at: NaiveDateTime) -> String {
        let stamp = started_at.format(TRANSCRIPT_TS_FORMAT);
        match label {
            Some(label) => format!("{}{}.txt", label, stamp),
            None => format!("{}.txt", stamp),
        }
    }

    /// Create a log handle in `dir`; the file itself appears on first append
    pub fn new(dir: &Path, label: Option<&str>, started_at: NaiveDateTime) -> Self {
        Self {
            path: dir.join(Self::file_name(label, started_at)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one batch's text plus a newline, open-append-close
    pub async fn append(&self, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(text.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_detection_is_case_insensitive_substring() {
        let phrases = ControlPhrases::new("robot jones", "go away");

        let hits = phrases.detect("Robot Jones, can you hear me");
        assert!(hits.activation);
        assert!(!hits.shutdown);

        let hits = phrases.detect("I SAID ROBOT JONES");
        assert!(hits.activation);

        let hits = phrases.detect("please GO AWAY now");
        assert!(hits.shutdown);
        assert!(!hits.activation);
    }

    #[test]
    fn test_detection_no_phrase_no_hits() {
        let phrases = ControlPhrases::new("robot jones", "go away");
        assert_eq!(phrases.detect("just some talking"), PhraseHits::default());
    }

    #[test]
    fn test_both_phrases_in_one_batch() {
        let phrases = ControlPhrases::new("robot jones", "go away");
        let hits = phrases.detect("robot jones, go away");
        assert!(hits.activation);
        assert!(hits.shutdown);
    }

    #[test]
    fn test_file_name_with_and_without_label() {
        assert_eq!(
            TranscriptLog::file_name(Some("meeting"), started()),
            "meeting240101_1230.txt"
        );
        assert_eq!(TranscriptLog::file_name(None, started()), "240101_1230.txt");
    }

    #[tokio::test]
    async fn test_append_accumulates_lines() {
        let temp = TempDir::new().unwrap();
        let log = TranscriptLog::new(temp.path(), Some("run"), started());

        log.append("first batch").await.unwrap();
        log.append("second batch").await.unwrap();

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        assert_eq!(content, "first batch\nsecond batch\n");
    }
}
