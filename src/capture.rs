//! Segment producer: cpal input device → fixed-duration WAV segments.
//!
//! The capture stream appends converted samples to a shared buffer from
//! the audio callback; a writer loop on the same thread drains one
//! chunk's worth at a time and writes it as a timestamp-named segment in
//! the inbox. Segments are written whole to a hidden temp name and then
//! renamed, so the aggregator never sees a file that is still being
//! written.
//!
//! cpal streams are not Send, so the whole producer lives on one
//! dedicated thread for the life of the process.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use hound::{SampleFormat as WavSampleFormat, WavSpec, WavWriter};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{AudioDirs, Config};
use crate::pipeline::segment::Segment;

/// Errors that can occur in the capture producer
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no default input device")]
    NoInputDevice,

    #[error("unsupported channel count {0} (capture is mono)")]
    UnsupportedChannels(u16),

    #[error("unsupported device sample format {0:?} (need F32 or I16)")]
    UnsupportedSampleFormat(SampleFormat),

    #[error("device config error: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("stream build error: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("stream start error: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture parameters lifted out of [`Config`] for the producer thread
#[derive(Debug, Clone)]
struct CaptureSettings {
    inbox: PathBuf,
    chunk_secs: u64,
    sample_rate: u32,
    channels: u16,
}

/// Shared PCM buffer. The audio callback appends; the writer loop drains.
struct SampleBuffer {
    samples: Mutex<Vec<i16>>,
}

impl SampleBuffer {
    fn new() -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, samples: &[i16]) {
        if let Ok(mut guard) = self.samples.lock() {
            guard.extend_from_slice(samples);
        }
    }

    fn len(&self) -> usize {
        self.samples.lock().map(|g| g.len()).unwrap_or(0)
    }

    /// Drain exactly `n` samples from the front
    fn take(&self, n: usize) -> Vec<i16> {
        match self.samples.lock() {
            Ok(mut guard) => {
                let n = n.min(guard.len());
                guard.drain(..n).collect()
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Handle to the capture thread
pub struct CaptureHandle {
    thread: std::thread::JoinHandle<Result<(), CaptureError>>,
}

impl CaptureHandle {
    /// Wait for the producer thread to finish and surface its outcome
    pub fn join(self) -> Result<(), CaptureError> {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(CaptureError::Io(std::io::Error::other(
                "capture thread panicked",
            ))),
        }
    }
}

/// Fixed-cadence segment recorder.
pub struct SegmentRecorder;

impl SegmentRecorder {
    /// Start the producer on its own thread.
    ///
    /// Blocks until the capture device is open and streaming; a device
    /// that cannot be opened is a fatal startup error for the whole
    /// pipeline. A mid-stream failure trips the shared shutdown signal so
    /// the consumer loop winds down, and surfaces from
    /// [`CaptureHandle::join`].
    pub fn spawn(
        config: &Config,
        dirs: &AudioDirs,
        shutdown_rx: watch::Receiver<bool>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Result<CaptureHandle, CaptureError> {
        if config.channels != 1 {
            return Err(CaptureError::UnsupportedChannels(config.channels));
        }

        let settings = CaptureSettings {
            inbox: dirs.unprocessed(),
            chunk_secs: config.chunk_secs,
            sample_rate: config.sample_rate,
            channels: config.channels,
        };

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<bool>();

        let thread = std::thread::Builder::new()
            .name("earlog-capture".to_string())
            .spawn(move || {
                let outcome = run_capture(settings, shutdown_rx, ready_tx);
                if let Err(ref e) = outcome {
                    error!("capture failed: {}", e);
                    let _ = shutdown_tx.send(true);
                }
                outcome
            })?;

        match ready_rx.recv() {
            Ok(true) => Ok(CaptureHandle { thread }),
            _ => {
                // Startup failed; the thread result carries the error
                match thread.join() {
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(())) => Err(CaptureError::Io(std::io::Error::other(
                        "capture thread exited during startup",
                    ))),
                    Err(_) => Err(CaptureError::Io(std::io::Error::other(
                        "capture thread panicked",
                    ))),
                }
            }
        }
    }
}

/// Producer thread body: open the device, then write one segment per chunk
fn run_capture(
    settings: CaptureSettings,
    shutdown: watch::Receiver<bool>,
    ready: std::sync::mpsc::Sender<bool>,
) -> Result<(), CaptureError> {
    let buffer = Arc::new(SampleBuffer::new());

    let stream = match build_input_stream(Arc::clone(&buffer), settings.sample_rate) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(false);
            return Err(e);
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(false);
        return Err(e.into());
    }
    let _ = ready.send(true);

    let chunk_samples = settings.sample_rate as usize * settings.chunk_secs as usize;
    info!(
        sample_rate = settings.sample_rate,
        chunk_secs = settings.chunk_secs,
        "recording started"
    );

    let mut iters = 0u64;
    while !*shutdown.borrow() {
        std::thread::sleep(Duration::from_millis(100));

        if buffer.len() >= chunk_samples {
            // Name from the time at the start of the write
            let captured_at = Local::now().naive_local();
            let samples = buffer.take(chunk_samples);
            write_segment(&settings, captured_at, &samples)?;
            iters += 1;
            debug!(iters, "segment recorded");
        }
    }

    drop(stream);
    info!(segments = iters, "recording stopped");
    Ok(())
}

/// Open the default input device and feed converted samples to `buffer`
fn build_input_stream(buffer: Arc<SampleBuffer>, target_rate: u32) -> Result<Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device.default_input_config()?;
    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();

    info!(
        device = %name,
        device_rate,
        device_channels,
        target_rate,
        "opening input device"
    );

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = to_mono_i16(data, device_channels, device_rate, target_rate);
                buffer.push(&mono);
            },
            move |err| warn!("audio stream error: {}", err),
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let as_f32: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                let mono = to_mono_i16(&as_f32, device_channels, device_rate, target_rate);
                buffer.push(&mono);
            },
            move |err| warn!("audio stream error: {}", err),
            None,
        )?,
        other => return Err(CaptureError::UnsupportedSampleFormat(other)),
    };

    Ok(stream)
}

/// Convert interleaved multi-channel f32 at any rate to mono i16 at the
/// target rate (nearest-sample resampling).
fn to_mono_i16(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<i16> {
    if channels == 0 || samples.is_empty() {
        return Vec::new();
    }

    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    let scale = |s: f32| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;

    if from_rate == to_rate {
        return mono.into_iter().map(scale).collect();
    }

    let out_len = (mono.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = (i as f64 * from_rate as f64 / to_rate as f64) as usize;
        if src_idx >= mono.len() {
            break;
        }
        out.push(scale(mono[src_idx]));
    }
    out
}

/// Write one finished segment: whole file under a hidden temp name, then
/// rename to its final timestamp name.
fn write_segment(
    settings: &CaptureSettings,
    captured_at: chrono::NaiveDateTime,
    samples: &[i16],
) -> Result<(), CaptureError> {
    let file_name = Segment::file_name_for(captured_at);
    let tmp = settings.inbox.join(format!(".{}.partial", file_name));
    let target = settings.inbox.join(&file_name);

    let spec = WavSpec {
        channels: settings.channels,
        sample_rate: settings.sample_rate,
        bits_per_sample: 16,
        sample_format: WavSampleFormat::Int,
    };

    let mut writer = WavWriter::create(&tmp, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    std::fs::rename(&tmp, &target)?;
    debug!(segment = %file_name, samples = samples.len(), "segment written");

    Ok(())
}
