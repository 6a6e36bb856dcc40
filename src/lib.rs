//! earlog - live audio listener with filesystem-queued transcription
//!
//! Captures audio from the default input device in fixed-duration
//! segments and transcribes them asynchronously, watching the transcript
//! for an activation phrase and a shutdown phrase.
//!
//! # Architecture
//!
//! Two independently scheduled loops share nothing but three directories
//! under one audio root:
//!
//! - Producer: writes timestamp-named WAV segments into `unprocessed`
//! - Consumer: merges pending segments chronologically into `stage`,
//!   archives the originals, transcribes the merged unit, appends the
//!   text to the run transcript
//!
//! Files move by whole-file-write-then-rename only, which makes the
//! handoff crash-safe without locks: a startup sweep returns anything a
//! prior run left behind to `archive`.
//!
//! # Modules
//!
//! - `capture`: cpal input device → segment files
//! - `pipeline`: aggregation, archival lifecycle, consumer loop
//! - `transcribe`: transcription engine boundary (Whisper CLI)
//! - `transcript`: append-only transcript log + control phrases
//! - `config`: layered configuration
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Listen and transcribe with a named transcript
//! earlog listen -t -n standup
//!
//! # Inspect the queue directories
//! earlog status
//! ```

pub mod capture;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod transcribe;
pub mod transcript;

// Re-export main types at crate root for convenience
pub use capture::{CaptureError, CaptureHandle, SegmentRecorder};
pub use config::{AudioDirs, Config};
pub use pipeline::{Aggregator, Archiver, Driver, MergeError, MergedBatch, Segment, SweepReport};
pub use transcribe::{Transcription, TranscriptionEngine, WhisperCli};
pub use transcript::{ControlPhrases, PhraseHits, TranscriptLog};
