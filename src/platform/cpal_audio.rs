//! Microphone input through cpal.
//!
//! cpal delivers samples on its own callback thread. The callback pushes them into a
//! bounded queue and the audio recorder thread pulls fixed-size chunks out of it, which
//! turns the push-style stream into the blocking `read_chunk` the recorder expects.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SizedSample;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

use crate::recording::error::RecorderError;

use super::{AudioBackend, AudioFormat, AudioInput};

/// Longest a chunk read waits for the device.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Seconds of audio buffered before the oldest samples are dropped.
const MAX_BUFFERED_SECS: usize = 10;

/// Opens input streams on a device picked by name, index, or `"default"`.
pub struct CpalAudio {
    device: String,
}

impl CpalAudio {
    pub fn new(device: String) -> Self {
        Self { device }
    }
}

impl AudioBackend for CpalAudio {
    fn open_input_stream(&self, format: AudioFormat) -> Result<Box<dyn AudioInput>, RecorderError> {
        let unavailable = |e: anyhow::Error| RecorderError::DeviceUnavailable {
            device: "audio",
            reason: e.to_string(),
        };

        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device == "default" {
                host.default_input_device()
                    .ok_or_else(|| anyhow!("No audio input device available"))
            } else {
                find_device_by_name(&host, &self.device)
            }
        })
        .map_err(unavailable)?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let config = pick_config(&device, format).map_err(unavailable)?;
        let actual = AudioFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        tracing::debug!(
            "Device configuration: {}Hz, {} channels, {:?}",
            actual.sample_rate,
            actual.channels,
            config.sample_format()
        );

        let buffer = Arc::new(SampleQueue::new(
            actual.sample_rate as usize * usize::from(actual.channels) * MAX_BUFFERED_SECS,
        ));
        let stream = match config.sample_format() {
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.config(), &buffer),
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.config(), &buffer),
            other => Err(anyhow!("unsupported sample format {other:?}")),
        }
        .map_err(unavailable)?;

        stream
            .play()
            .map_err(|e| unavailable(anyhow!("failed to start audio stream: {e}")))?;
        tracing::debug!("Audio stream started");

        Ok(Box::new(CpalInput {
            _stream: stream,
            buffer,
            format: actual,
        }))
    }
}

/// Prefers a config matching `format` exactly and falls back to the device default.
fn pick_config(device: &cpal::Device, format: AudioFormat) -> Result<cpal::SupportedStreamConfig> {
    let exact = device.supported_input_configs().ok().and_then(|mut configs| {
        configs
            .find(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate().0 <= format.sample_rate
                    && c.max_sample_rate().0 >= format.sample_rate
                    && matches!(
                        c.sample_format(),
                        cpal::SampleFormat::I16 | cpal::SampleFormat::F32
                    )
            })
            .map(|c| c.with_sample_rate(cpal::SampleRate(format.sample_rate)))
    });

    match exact {
        Some(config) => Ok(config),
        None => device
            .default_input_config()
            .map_err(|e| anyhow!("no usable input configuration: {e}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: &Arc<SampleQueue>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: cpal::FromSample<T>,
{
    let queue = Arc::clone(buffer);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                queue.push(data.iter().map(|&s| s.to_sample::<i16>()));
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| anyhow!("failed to build audio stream: {e}"))
}

/// Bounded FIFO between the cpal callback and the recorder thread.
struct SampleQueue {
    samples: Mutex<VecDeque<i16>>,
    ready: Condvar,
    capacity: usize,
}

impl SampleQueue {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn push(&self, incoming: impl Iterator<Item = i16>) {
        let mut samples = self.samples.lock().unwrap_or_else(|p| p.into_inner());
        samples.extend(incoming);
        let overflow = samples.len().saturating_sub(self.capacity);
        if overflow > 0 {
            samples.drain(..overflow);
        }
        self.ready.notify_all();
    }

    fn pop(&self, count: usize, timeout: Duration) -> Option<Vec<i16>> {
        let samples = self.samples.lock().unwrap_or_else(|p| p.into_inner());
        let (mut samples, _) = self
            .ready
            .wait_timeout_while(samples, timeout, |s| s.len() < count)
            .unwrap_or_else(|p| p.into_inner());
        if samples.len() < count {
            return None;
        }
        Some(samples.drain(..count).collect())
    }

    fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

/// A running cpal input stream. Dropping it closes the device.
struct CpalInput {
    _stream: cpal::Stream,
    buffer: Arc<SampleQueue>,
    format: AudioFormat,
}

impl AudioInput for CpalInput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_chunk(&mut self, frames: usize) -> Result<Vec<i16>, RecorderError> {
        let count = frames * usize::from(self.format.channels);
        self.buffer.pop(count, READ_TIMEOUT).ok_or_else(|| {
            RecorderError::AudioReadFailure(format!(
                "no audio from device within {READ_TIMEOUT:?}"
            ))
        })
    }

    fn discard_pending(&mut self) {
        self.buffer.clear();
    }
}

/// One entry of `fluxrec list-devices`.
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    /// Default sample rate and channel count, if the device reports one.
    pub default_format: Option<AudioFormat>,
}

/// Enumerates input devices in the order `[audio] device = "<index>"` refers to them.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>> {
    let (host, devices) = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate audio devices: {e}"))?
            .filter(|d| d.name().is_ok())
            .collect();
        Ok((host, devices))
    })?;

    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    Ok(devices
        .iter()
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            InputDeviceInfo {
                index,
                is_default: default_name.as_ref() == Some(&name),
                default_format: device.default_input_config().ok().map(|c| AudioFormat {
                    sample_rate: c.sample_rate().0,
                    channels: c.channels(),
                }),
                name,
            }
        })
        .collect())
}

/// Finds an input device by its numeric index or exact name.
///
/// # Errors
/// - If no device with the specified name/index is found
fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    let devices: Vec<_> = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            anyhow!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            )
        });
    }

    devices
        .into_iter()
        .find(|d| d.name().is_ok_and(|name| name == device_spec))
        .ok_or_else(|| {
            anyhow!(
                "Audio input device '{device_spec}' not found. Use 'fluxrec list-devices' to see available devices."
            )
        })
}

/// Runs `f` with stderr pointed at /dev/null, hiding ALSA's device enumeration noise.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// ALSA only exists on Linux.
#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}
