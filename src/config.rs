//! Configuration for earlog.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (EARLOG_AUDIO_DIR, EARLOG_MODEL)
//! 2. Config file (.earlog/config.yaml)
//! 3. Defaults (./audio, base model, built-in phrases)
//!
//! Config file discovery:
//! - Searches current directory and parents for .earlog/config.yaml
//! - Paths in config file are relative to the config file's parent directory
//!
//! The resolved [`Config`] is a plain value handed to each component at
//! construction; nothing reads configuration behind the pipeline's back.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Name of the merged unit inside the stage directory.
pub const STAGE_FILE_NAME: &str = "sounds.wav";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub phrases: PhraseSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioSection {
    /// Queue root directory (relative to config file's project root)
    pub root: Option<String>,
    /// Segment length in seconds
    pub chunk_secs: Option<u64>,
    /// Consumer poll backoff in seconds
    pub poll_interval_secs: Option<u64>,
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Capture channel count
    pub channels: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhraseSection {
    pub activation: Option<String>,
    pub shutdown: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    /// Whisper model name (tiny, base, small, large)
    pub model: Option<String>,
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the three-directory audio queue
    pub audio_root: PathBuf,
    /// Segment length in seconds
    pub chunk_secs: u64,
    /// Consumer poll backoff in seconds when the inbox is empty
    pub poll_interval_secs: u64,
    /// Delay before the first poll, letting capture fill its first chunk
    pub warmup_ms: u64,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Capture channel count (mono capture only)
    pub channels: u16,
    /// Whisper model name
    pub model: String,
    /// Activation control phrase (case-insensitive substring)
    pub activation_phrase: String,
    /// Shutdown control phrase (case-insensitive substring)
    pub shutdown_phrase: String,
    /// Optional transcript file label for this run
    pub transcript_label: Option<String>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio_root: PathBuf::from("audio"),
            chunk_secs: 3,
            poll_interval_secs: 1,
            warmup_ms: 3500,
            sample_rate: 44_100,
            channels: 1,
            model: "base".to_string(),
            activation_phrase: "robot jones".to_string(),
            shutdown_phrase: "go away".to_string(),
            transcript_label: None,
            config_file: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = find_config_file() {
            let file = load_config_file(&config_path)?;

            // Base directory is the parent of .earlog/ (the project root)
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."));

            if let Some(ref root) = file.audio.root {
                config.audio_root = resolve_path(base_dir, root);
            }
            if let Some(chunk_secs) = file.audio.chunk_secs {
                config.chunk_secs = chunk_secs;
            }
            if let Some(poll) = file.audio.poll_interval_secs {
                config.poll_interval_secs = poll;
            }
            if let Some(rate) = file.audio.sample_rate {
                config.sample_rate = rate;
            }
            if let Some(channels) = file.audio.channels {
                config.channels = channels;
            }
            if let Some(activation) = file.phrases.activation {
                config.activation_phrase = activation;
            }
            if let Some(shutdown) = file.phrases.shutdown {
                config.shutdown_phrase = shutdown;
            }
            if let Some(model) = file.engine.model {
                config.model = model;
            }

            config.config_file = Some(config_path);
        }

        // Env vars win over the config file
        if let Ok(root) = std::env::var("EARLOG_AUDIO_DIR") {
            config.audio_root = PathBuf::from(root);
        }
        if let Ok(model) = std::env::var("EARLOG_MODEL") {
            config.model = model;
        }

        Ok(config)
    }
}

/// Find config file by searching current directory and parents, falling
/// back to ~/.earlog/config.yaml
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".earlog").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let fallback = dirs::home_dir()?.join(".earlog").join("config.yaml");
    if fallback.exists() {
        return Some(fallback);
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// The three queue directories under one audio root.
///
/// `unprocessed` is the producer's inbox, `stage` holds at most one merged
/// unit, `archive` is the terminal store. Nothing is ever deleted from
/// `archive`; files only accumulate there.
#[derive(Debug, Clone)]
pub struct AudioDirs {
    root: PathBuf,
}

impl AudioDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inbox of segment files awaiting aggregation
    pub fn unprocessed(&self) -> PathBuf {
        self.root.join("unprocessed")
    }

    /// Holds at most one merged unit at a time
    pub fn stage(&self) -> PathBuf {
        self.root.join("stage")
    }

    /// Terminal resting place for every segment and merged unit
    pub fn archive(&self) -> PathBuf {
        self.root.join("archive")
    }

    /// Path of the merged unit inside `stage`
    pub fn stage_file(&self) -> PathBuf {
        self.stage().join(STAGE_FILE_NAME)
    }

    /// Create all three directories if missing
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.unprocessed()).await?;
        tokio::fs::create_dir_all(self.stage()).await?;
        tokio::fs::create_dir_all(self.archive()).await?;
        Ok(())
    }
}
