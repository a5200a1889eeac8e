//! Microphone capture on a dedicated thread.
//!
//! The recorder opens the input stream on its own thread, reads fixed-size chunks into
//! memory while not paused, and writes every chunk to a WAV file in one pass when the
//! session stops. A chunk that fails to read is dropped; the thread keeps going.

use hound::WavWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::platform::{AudioBackend, AudioFormat};

use super::error::RecorderError;
use super::join_with_timeout;
use super::scheduler::LoopControl;

/// Frames per chunk read from the device.
pub const CHUNK_FRAMES: usize = 1024;

const PAUSED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A finished standalone audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub chunks: usize,
    pub dropped_chunks: usize,
}

impl AudioArtifact {
    /// Duration of the recorded audio.
    pub fn duration(&self) -> Duration {
        let frames = (self.chunks * CHUNK_FRAMES) as f64;
        Duration::from_secs_f64(frames / f64::from(self.format.sample_rate.max(1)))
    }
}

type AudioResult = Result<Option<AudioArtifact>, RecorderError>;

/// Handle to the running audio thread.
pub struct AudioCaptureRecorder {
    handle: Option<JoinHandle<AudioResult>>,
}

impl AudioCaptureRecorder {
    /// Starts capturing into memory; the WAV is written to `path` on stop.
    ///
    /// Pause and stop are driven through `control`, the same flags the capture loop
    /// observes.
    ///
    /// # Errors
    /// - If the OS refuses to spawn the thread. Device problems surface from
    ///   [`AudioCaptureRecorder::join`] instead.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        path: PathBuf,
        control: Arc<LoopControl>,
    ) -> Result<Self, RecorderError> {
        let thread_path = path.clone();
        let handle = thread::Builder::new()
            .name("fluxrec-audio".to_string())
            .spawn(move || run_recorder(backend.as_ref(), &thread_path, &control))
            .map_err(|e| RecorderError::DeviceUnavailable {
                device: "audio",
                reason: format!("failed to spawn audio thread: {e}"),
            })?;

        tracing::debug!("Audio recorder started: {}", path.display());
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// True once the thread has exited, which before a stop request means the device
    /// could not be opened.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits up to `timeout` for the thread to flush its WAV file.
    ///
    /// Returns `Ok(None)` when nothing was captured.
    ///
    /// # Errors
    /// - `DeviceUnavailable` if the input stream could not be opened
    /// - `ThreadJoinTimeout` if the thread did not finish in time
    /// - `Io` if the WAV file could not be written
    pub fn join(mut self, timeout: Duration) -> AudioResult {
        match self.handle.take() {
            Some(handle) => join_with_timeout(handle, timeout, "audio")?,
            None => Ok(None),
        }
    }
}

fn run_recorder(backend: &dyn AudioBackend, path: &Path, control: &LoopControl) -> AudioResult {
    let mut input = backend
        .open_input_stream(AudioFormat::CAPTURE)
        .map_err(|e| match e {
            RecorderError::DeviceUnavailable { .. } => e,
            other => RecorderError::DeviceUnavailable {
                device: "audio",
                reason: other.to_string(),
            },
        })?;

    let format = input.format();
    if format != AudioFormat::CAPTURE {
        tracing::warn!(
            "Requested {}Hz/{}ch audio but device delivers {}Hz/{}ch. Recording at device format.",
            AudioFormat::CAPTURE.sample_rate,
            AudioFormat::CAPTURE.channels,
            format.sample_rate,
            format.channels
        );
    }

    let mut chunks: Vec<Vec<i16>> = Vec::new();
    let mut dropped_chunks = 0usize;
    let mut was_paused = false;

    while control.is_running() {
        if control.is_paused() {
            was_paused = true;
            thread::sleep(PAUSED_POLL_INTERVAL);
            continue;
        }
        if was_paused {
            // Whatever the device buffered during the pause must not leak into the file.
            input.discard_pending();
            was_paused = false;
        }

        match input.read_chunk(CHUNK_FRAMES) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                if dropped_chunks == 0 {
                    tracing::debug!("Dropping audio chunk: {}", e);
                }
                dropped_chunks += 1;
            }
        }
    }

    // Dropping the input closes the device stream before the file is written.
    drop(input);

    if dropped_chunks > 0 {
        tracing::warn!("{} audio chunks dropped during recording", dropped_chunks);
    }
    if chunks.is_empty() {
        tracing::warn!("Audio recording stopped with no samples captured");
        return Ok(None);
    }

    write_wav(path, format, &chunks)?;
    let artifact = AudioArtifact {
        path: path.to_path_buf(),
        format,
        chunks: chunks.len(),
        dropped_chunks,
    };
    tracing::info!(
        "Audio saved: {} ({:.2}s, {} chunks)",
        path.display(),
        artifact.duration().as_secs_f64(),
        artifact.chunks
    );
    Ok(Some(artifact))
}

/// Writes interleaved 16-bit chunks as a PCM WAV file.
fn write_wav(path: &Path, format: AudioFormat, chunks: &[Vec<i16>]) -> Result<(), RecorderError> {
    let wav_err = |e: hound::Error| RecorderError::io(path, std::io::Error::other(e.to_string()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RecorderError::io(parent, e))?;
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(wav_err)?;
    for sample in chunks.iter().flatten() {
        writer.write_sample(*sample).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;
    Ok(())
}
