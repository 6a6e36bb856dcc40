//! Consumer loop: poll, merge, transcribe, log, detect.
//!
//! One merged batch is in flight at a time; the synchronous engine call
//! is the pipeline's backpressure point, so the inbox simply accumulates
//! while inference runs. Shutdown (signal or phrase) is observed between
//! iterations only — an in-flight transcription always runs to
//! completion first.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{AudioDirs, Config};
use crate::pipeline::aggregator::{Aggregator, MergedBatch};
use crate::pipeline::lifecycle::Archiver;
use crate::transcribe::TranscriptionEngine;
use crate::transcript::{ControlPhrases, TranscriptLog};

/// Why the consumer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// External shutdown signal observed
    Signalled,

    /// Shutdown phrase detected in a batch
    PhraseDetected,
}

/// The aggregator/transcription consumer.
pub struct Driver<E> {
    aggregator: Aggregator,
    archiver: Archiver,
    engine: E,
    log: TranscriptLog,
    phrases: ControlPhrases,
    poll_interval: Duration,
    warmup: Duration,
}

impl<E: TranscriptionEngine> Driver<E> {
    pub fn new(config: &Config, dirs: AudioDirs, engine: E, log: TranscriptLog) -> Self {
        Self {
            aggregator: Aggregator::new(dirs.clone()),
            archiver: Archiver::new(dirs),
            engine,
            log,
            phrases: ControlPhrases::new(&config.activation_phrase, &config.shutdown_phrase),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            warmup: Duration::from_millis(config.warmup_ms),
        }
    }

    /// Run until shutdown.
    ///
    /// Startup: archival sweep (recover anything a prior run left in the
    /// queue area), then a warm-up wait so the producer can fill its
    /// first chunk. Termination: final sweep, best-effort even when the
    /// loop itself failed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.archiver
            .sweep()
            .await
            .context("startup archival sweep failed")?;

        info!(engine = self.engine.name(), "waiting for capture to warm up");
        self.wait_or_shutdown(self.warmup, &mut shutdown).await;

        let outcome = self.run_loop(&mut shutdown).await;

        if let Err(e) = self.archiver.sweep().await {
            warn!("final archival sweep failed: {}", e);
        }

        match outcome? {
            LoopExit::Signalled => info!("stopped on shutdown signal"),
            LoopExit::PhraseDetected => info!("stopped on shutdown phrase"),
        }
        Ok(())
    }

    async fn run_loop(&self, shutdown: &mut watch::Receiver<bool>) -> Result<LoopExit> {
        loop {
            if *shutdown.borrow() {
                return Ok(LoopExit::Signalled);
            }

            match self.aggregator.merge_once().await? {
                None => {
                    debug!("no files in inbox, waiting");
                    self.wait_or_shutdown(self.poll_interval, shutdown).await;
                }
                Some(batch) => {
                    if self.process_batch(&batch).await? {
                        return Ok(LoopExit::PhraseDetected);
                    }
                }
            }
        }
    }

    /// Transcribe one merged batch. Returns true when the shutdown
    /// phrase was detected.
    async fn process_batch(&self, batch: &MergedBatch) -> Result<bool> {
        info!(
            segments = batch.segments,
            oldest = %batch.oldest,
            latest = %batch.latest,
            "running transcription"
        );

        let started = Instant::now();
        let transcription = self
            .engine
            .transcribe(&batch.path)
            .await
            .with_context(|| format!("transcription failed for batch {}", batch.oldest))?;
        let elapsed = started.elapsed();

        self.log
            .append(&transcription.text)
            .await
            .context("failed to append transcript")?;

        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            chars = transcription.text.len(),
            language = %transcription.language,
            "batch transcribed"
        );

        let hits = self.phrases.detect(&transcription.text);
        if hits.activation {
            warn!("!!!! ACTIVATION PHRASE DETECTED !!!!");
        }
        if hits.shutdown {
            warn!("!!!! SHUTDOWN PHRASE DETECTED !!!!");
            return Ok(true);
        }

        Ok(false)
    }

    /// Sleep for `duration`, waking early if shutdown is signalled
    async fn wait_or_shutdown(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.changed() => {}
        }
    }
}
