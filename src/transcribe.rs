//! Transcription engine boundary.
//!
//! The pipeline makes exactly one request of an engine: "transcribe the
//! audio at this path" and expects plain text back. Keeping that behind a
//! trait lets the blocking Whisper CLI be swapped for another backend
//! without touching the batching logic, and lets tests substitute stubs.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

/// Result of transcribing one merged unit
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub duration_seconds: f64,
}

/// An external speech-to-text engine.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Human-readable engine name
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio_path`.
    ///
    /// Expected to block for the duration of inference; the caller treats
    /// this as the pipeline's backpressure point.
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcription>;
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    end: f64,
}

/// Engine backed by the local `whisper` binary.
pub struct WhisperCli {
    binary: PathBuf,
    model: String,
}

impl WhisperCli {
    /// Use the binary from WHISPER_PATH, falling back to `whisper` on PATH
    pub fn new(model: impl Into<String>) -> Self {
        let binary = std::env::var("WHISPER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("whisper"));

        Self {
            binary,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCli {
    fn name(&self) -> &str {
        "whisper-cli"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcription> {
        // Whisper writes its result files into --output_dir
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

        let output = Command::new(&self.binary)
            .arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run whisper")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr);
        }

        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        let whisper: WhisperOutput =
            serde_json::from_str(&json_content).context("Failed to parse whisper JSON")?;

        let duration = whisper.segments.last().map(|s| s.end).unwrap_or(0.0);

        Ok(Transcription {
            text: whisper.text.trim().to_string(),
            language: if whisper.language.is_empty() {
                "en".to_string()
            } else {
                whisper.language
            },
            duration_seconds: duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_output_parsing() {
        let json = r#"{
            "text": "  hello there  ",
            "language": "en",
            "segments": [{"end": 1.5}, {"end": 3.0}]
        }"#;

        let parsed: WhisperOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text.trim(), "hello there");
        assert_eq!(parsed.language, "en");
        assert_eq!(parsed.segments.last().unwrap().end, 3.0);
    }

    #[test]
    fn test_whisper_output_defaults() {
        let parsed: WhisperOutput = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(parsed.language, "");
        assert!(parsed.segments.is_empty());
    }
}
