//! In-process fakes for the platform collaborators, the encoder and the encoding tool.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::platform::{
    AudioBackend, AudioFormat, AudioInput, CameraBackend, CameraDevice, ScreenBackend,
};

use super::encoder::{EncoderFactory, EncoderSpec, VideoEncoderSink};
use super::error::RecorderError;
use super::frame::{Frame, FrameSize, PixelFormat, RawImage};
use super::postprocess::{EncodingTool, MergeSettings};
use super::target::CaptureRect;

/// Hash of a frame's pixels, for comparing output streams.
pub fn digest(frame: &Frame) -> u64 {
    let mut hasher = DefaultHasher::new();
    frame.size().width.hash(&mut hasher);
    frame.size().height.hash(&mut hasher);
    frame.as_bytes().hash(&mut hasher);
    hasher.finish()
}

/// Deterministic RGB pattern for a rectangle.
///
/// Already in the pipeline's layout, so a grab costs one copy and session tests time
/// the scheduler rather than pixel conversion. Conversion has its own tests in `frame`.
fn pattern(width: u32, height: u32) -> RawImage {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8]);
        }
    }
    RawImage {
        width,
        height,
        format: PixelFormat::Rgb8,
        data,
    }
}

pub struct FakeScreen {
    monitors: Vec<CaptureRect>,
    windows: HashMap<u32, CaptureRect>,
    fail_every: Option<usize>,
    clip: Option<(u32, u32)>,
    grabs: AtomicUsize,
    patterns: Mutex<HashMap<(u32, u32), RawImage>>,
}

impl FakeScreen {
    /// `count` side-by-side 1920x1080 monitors.
    pub fn with_monitors(count: usize) -> Self {
        Self {
            monitors: (0..count)
                .map(|i| CaptureRect::new(1920 * i as i32, 0, 1920, 1080))
                .collect(),
            windows: HashMap::new(),
            fail_every: None,
            clip: None,
            grabs: AtomicUsize::new(0),
            patterns: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window(mut self, handle: u32, rect: CaptureRect) -> Self {
        self.windows.insert(handle, rect);
        self
    }

    /// Every grab fails.
    pub fn failing_grabs(self) -> Self {
        self.failing_every(1)
    }

    /// Every `n`th grab fails.
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Grabs come back no larger than `width`x`height`.
    pub fn clip_grabs_to(mut self, width: u32, height: u32) -> Self {
        self.clip = Some((width, height));
        self
    }

    pub fn monitors(&self) -> &[CaptureRect] {
        &self.monitors
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl ScreenBackend for FakeScreen {
    fn list_monitors(&self) -> Result<Vec<CaptureRect>, RecorderError> {
        Ok(self.monitors.clone())
    }

    fn window_rect(&self, handle: u32) -> Result<CaptureRect, RecorderError> {
        self.windows
            .get(&handle)
            .copied()
            .ok_or_else(|| RecorderError::TargetUnavailable(format!("no window {handle}")))
    }

    fn grab_pixels(&self, rect: &CaptureRect) -> Result<RawImage, RecorderError> {
        let n = self.grabs.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(every) = self.fail_every {
            if n % every == 0 {
                return Err(RecorderError::CaptureFailure(format!("fake grab {n} failed")));
            }
        }
        let (width, height) = match self.clip {
            Some((w, h)) => (rect.width.min(w), rect.height.min(h)),
            None => (rect.width, rect.height),
        };
        let mut patterns = self.patterns.lock().unwrap();
        Ok(patterns
            .entry((width, height))
            .or_insert_with(|| pattern(width, height))
            .clone())
    }
}

pub struct FakeCamera {
    size: Option<FrameSize>,
    opens: AtomicUsize,
    reads: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn producing(size: FrameSize) -> Self {
        Self {
            size: Some(size),
            opens: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Opens fine, every read fails.
    pub fn failing_reads() -> Self {
        Self {
            size: None,
            opens: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

struct FakeCameraDevice {
    size: Option<FrameSize>,
    reads: Arc<AtomicUsize>,
}

impl CameraDevice for FakeCameraDevice {
    fn read_frame(&mut self) -> Result<RawImage, RecorderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        match self.size {
            Some(size) => Ok(RawImage {
                width: size.width,
                height: size.height,
                format: PixelFormat::Rgb8,
                data: vec![200; size.width as usize * size.height as usize * 3],
            }),
            None => Err(RecorderError::DeviceUnavailable {
                device: "webcam",
                reason: "fake read failure".to_string(),
            }),
        }
    }
}

impl CameraBackend for FakeCamera {
    fn open_device(&self, _id: u32) -> Result<Box<dyn CameraDevice>, RecorderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCameraDevice {
            size: self.size,
            reads: Arc::clone(&self.reads),
        }))
    }
}

pub struct FakeAudio {
    available: bool,
    fail_every: Option<usize>,
    opens: Arc<AtomicUsize>,
}

impl FakeAudio {
    pub fn new() -> Self {
        Self {
            available: true,
            fail_every: None,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct FakeAudioInput {
    format: AudioFormat,
    fail_every: Option<usize>,
    reads: usize,
}

impl AudioInput for FakeAudioInput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_chunk(&mut self, frames: usize) -> Result<Vec<i16>, RecorderError> {
        self.reads += 1;
        // Roughly the device latency of one chunk.
        thread::sleep(Duration::from_millis(10));
        if let Some(every) = self.fail_every {
            if self.reads % every == 0 {
                return Err(RecorderError::AudioReadFailure("fake overflow".to_string()));
            }
        }
        Ok((0..frames * usize::from(self.format.channels))
            .map(|i| ((i % 64) as i16 - 32) * 100)
            .collect())
    }
}

impl AudioBackend for FakeAudio {
    fn open_input_stream(&self, format: AudioFormat) -> Result<Box<dyn AudioInput>, RecorderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(RecorderError::DeviceUnavailable {
                device: "audio",
                reason: "fake device missing".to_string(),
            });
        }
        Ok(Box::new(FakeAudioInput {
            format,
            fail_every: self.fail_every,
            reads: 0,
        }))
    }
}

#[derive(Default)]
struct EncoderLog {
    opened: Vec<EncoderSpec>,
    sizes: Vec<FrameSize>,
    digests: Vec<u64>,
    attempts: usize,
    closes: usize,
}

/// Encoder factory whose sinks record what they receive. Sinks also create the
/// output file so post-processing has something to work on.
#[derive(Clone, Default)]
pub struct FakeEncoder {
    log: Arc<Mutex<EncoderLog>>,
    fail_open: bool,
    fail_after: Option<usize>,
    reject_every: Option<usize>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Sinks reject every write after the first `n`.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sinks refuse every `n`th frame with a recoverable error.
    pub fn rejecting_every(mut self, n: usize) -> Self {
        self.reject_every = Some(n.max(1));
        self
    }

    /// A sink not tied to any output file.
    pub fn sink(&self) -> FakeSink {
        FakeSink {
            log: Arc::clone(&self.log),
            fail_after: self.fail_after,
            reject_every: self.reject_every,
            path: None,
            closed: false,
        }
    }

    pub fn opened(&self) -> Vec<EncoderSpec> {
        self.log.lock().unwrap().opened.clone()
    }

    pub fn frames_written(&self) -> usize {
        self.log.lock().unwrap().sizes.len()
    }

    pub fn frame_sizes(&self) -> Vec<FrameSize> {
        self.log.lock().unwrap().sizes.clone()
    }

    pub fn frame_digests(&self) -> Vec<u64> {
        self.log.lock().unwrap().digests.clone()
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }
}

impl EncoderFactory for FakeEncoder {
    fn open(&self, spec: &EncoderSpec) -> Result<Box<dyn VideoEncoderSink>, RecorderError> {
        if self.fail_open {
            return Err(RecorderError::EncoderOpen("fake codec unsupported".to_string()));
        }
        if let Some(parent) = spec.path.parent() {
            fs::create_dir_all(parent).map_err(|e| RecorderError::io(parent, e))?;
        }
        fs::write(&spec.path, b"").map_err(|e| RecorderError::io(&spec.path, e))?;
        self.log.lock().unwrap().opened.push(spec.clone());
        let mut sink = self.sink();
        sink.path = Some(spec.path.clone());
        Ok(Box::new(sink))
    }
}

pub struct FakeSink {
    log: Arc<Mutex<EncoderLog>>,
    fail_after: Option<usize>,
    reject_every: Option<usize>,
    path: Option<PathBuf>,
    closed: bool,
}

impl VideoEncoderSink for FakeSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        let mut log = self.log.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if log.sizes.len() >= limit {
                return Err(RecorderError::EncoderWrite("fake broken pipe".to_string()));
            }
        }
        log.attempts += 1;
        if let Some(every) = self.reject_every {
            if log.attempts % every == 0 {
                return Err(RecorderError::CaptureFailure("fake frame rejected".to_string()));
            }
        }
        log.sizes.push(frame.size());
        log.digests.push(digest(frame));
        if let Some(path) = &self.path {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|e| RecorderError::EncoderWrite(e.to_string()))?;
            file.write_all(b"f")
                .map_err(|e| RecorderError::EncoderWrite(e.to_string()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecorderError> {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Merge {
        video: PathBuf,
        audio: PathBuf,
        output: PathBuf,
        gain: f32,
    },
    Trim {
        input: PathBuf,
        start_sec: f64,
        end_sec: f64,
        output: PathBuf,
    },
}

/// Records requested operations instead of running ffmpeg. On success it writes a
/// placeholder output file.
pub struct FakeTool {
    succeed: bool,
    calls: Mutex<Vec<ToolCall>>,
}

impl FakeTool {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    fn finish(&self, output: &Path, contents: &[u8]) -> Result<(), String> {
        if self.succeed {
            fs::write(output, contents).map_err(|e| e.to_string())
        } else {
            // A half-written file, like a crashed encoder would leave behind.
            let _ = fs::write(output, b"partial");
            Err("fake tool failure".to_string())
        }
    }
}

impl EncodingTool for FakeTool {
    fn mux_audio(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        settings: &MergeSettings,
    ) -> Result<(), RecorderError> {
        self.calls.lock().unwrap().push(ToolCall::Merge {
            video: video.to_path_buf(),
            audio: audio.to_path_buf(),
            output: output.to_path_buf(),
            gain: settings.gain,
        });
        self.finish(output, b"merged").map_err(RecorderError::Merge)
    }

    fn stream_copy_trim(
        &self,
        input: &Path,
        start_sec: f64,
        end_sec: f64,
        output: &Path,
    ) -> Result<(), RecorderError> {
        self.calls.lock().unwrap().push(ToolCall::Trim {
            input: input.to_path_buf(),
            start_sec,
            end_sec,
            output: output.to_path_buf(),
        });
        self.finish(output, b"trimmed").map_err(RecorderError::Trim)
    }
}
