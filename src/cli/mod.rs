//! Command-line interface for earlog.
//!
//! Provides commands for running the listener, inspecting the queue
//! directories, and dumping the resolved configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use crate::capture::SegmentRecorder;
use crate::config::{AudioDirs, Config};
use crate::pipeline::Driver;
use crate::transcribe::WhisperCli;
use crate::transcript::TranscriptLog;

/// earlog - live audio listener with filesystem-queued transcription
#[derive(Parser, Debug)]
#[command(name = "earlog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record from the default input device and transcribe continuously
    Listen {
        /// Transcribe mode (requires a transcript name)
        #[arg(short = 't', long = "transcribe")]
        transcribe: bool,

        /// Transcript name prefix for this run
        #[arg(short = 'n', long = "name")]
        name: Option<String>,

        /// Audio queue root directory
        #[arg(long)]
        audio_dir: Option<PathBuf>,

        /// Whisper model (tiny, base, small, large)
        #[arg(long)]
        model: Option<String>,

        /// Segment length in seconds
        #[arg(long)]
        chunk_secs: Option<u64>,
    },

    /// Show queue directory contents
    Status {
        /// Audio queue root directory
        #[arg(long)]
        audio_dir: Option<PathBuf>,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = Config::load()?;

        match self.command {
            Commands::Listen {
                transcribe,
                name,
                audio_dir,
                model,
                chunk_secs,
            } => execute_listen(config, transcribe, name, audio_dir, model, chunk_secs).await,
            Commands::Status { audio_dir } => execute_status(config, audio_dir).await,
            Commands::Config => execute_config(config),
        }
    }
}

/// Run the pipeline: producer thread + consumer loop until shutdown
async fn execute_listen(
    mut config: Config,
    transcribe: bool,
    name: Option<String>,
    audio_dir: Option<PathBuf>,
    model: Option<String>,
    chunk_secs: Option<u64>,
) -> Result<()> {
    // Transcribe mode insists on a named transcript; beyond that the
    // flag changes nothing
    if transcribe && name.is_none() {
        anyhow::bail!("name is required for transcribe mode\n try: earlog listen -t -n NAME");
    }

    if let Some(dir) = audio_dir {
        config.audio_root = dir;
    }
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(chunk_secs) = chunk_secs {
        config.chunk_secs = chunk_secs;
    }
    config.transcript_label = name;

    let dirs = AudioDirs::new(config.audio_root.clone());
    dirs.ensure()
        .await
        .context("failed to create audio queue directories")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Interrupt: clear the console and let the loop wind down
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print!("\x1B[2J\x1B[1;1H");
            let _ = signal_tx.send(true);
        }
    });

    // Device-open failure aborts here, before the consumer starts
    let capture = SegmentRecorder::spawn(&config, &dirs, shutdown_rx.clone(), shutdown_tx.clone())?;

    let started_at = Local::now().naive_local();
    let log = TranscriptLog::new(
        &std::env::current_dir()?,
        config.transcript_label.as_deref(),
        started_at,
    );
    info!(transcript = %log.path().display(), model = %config.model, "starting listener");

    let engine = WhisperCli::new(config.model.clone());
    let driver = Driver::new(&config, dirs, engine, log);
    let outcome = driver.run(shutdown_rx).await;

    // Stop the producer whichever way the loop ended
    let _ = shutdown_tx.send(true);
    let capture_outcome = capture.join();

    outcome?;
    capture_outcome?;
    println!("bye");
    Ok(())
}

/// Show the three queue directories and their file counts
async fn execute_status(mut config: Config, audio_dir: Option<PathBuf>) -> Result<()> {
    if let Some(dir) = audio_dir {
        config.audio_root = dir;
    }
    let dirs = AudioDirs::new(config.audio_root);

    println!();
    println!("Audio Queue Status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Root:  {}", dirs.root().display());
    println!();
    println!(
        "  unprocessed: {:>5} file(s)",
        count_files(&dirs.unprocessed()).await
    );
    println!(
        "  stage:       {:>5} file(s)",
        count_files(&dirs.stage()).await
    );
    println!(
        "  archive:     {:>5} file(s)",
        count_files(&dirs.archive()).await
    );
    println!();

    if !dirs.root().exists() {
        println!("⚠️  Audio root does not exist yet; run `earlog listen` to create it");
    }

    Ok(())
}

async fn count_files(dir: &std::path::Path) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                count += 1;
            }
        }
    }
    count
}

/// Show resolved configuration
fn execute_config(config: Config) -> Result<()> {
    println!();
    println!("earlog Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Audio root:        {}", config.audio_root.display());
    println!("Chunk length:      {} seconds", config.chunk_secs);
    println!("Poll interval:     {} second(s)", config.poll_interval_secs);
    println!("Sample rate:       {} Hz", config.sample_rate);
    println!("Channels:          {}", config.channels);
    println!("Model:             {}", config.model);
    println!("Activation phrase: {:?}", config.activation_phrase);
    println!("Shutdown phrase:   {:?}", config.shutdown_phrase);
    println!();
    match config.config_file {
        Some(path) => println!("Config file:       {}", path.display()),
        None => println!("Config file:       (none found, using defaults)"),
    }
    println!();

    Ok(())
}
