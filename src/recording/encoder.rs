//! Video encoder sink backed by an ffmpeg child process.
//!
//! Frames are piped to ffmpeg's stdin as raw RGB24; ffmpeg encodes and muxes them into
//! the requested container. The process is spawned when the sink opens so an unusable
//! encoder is detected before any capture thread starts.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::error::RecorderError;
use super::ffmpeg::find_ffmpeg;
use super::frame::{Frame, FrameSize};
use super::join_with_timeout;
use super::presets::Container;

/// How long to watch a freshly spawned encoder for an immediate exit.
const STARTUP_GRACE: Duration = Duration::from_millis(150);

/// Lines of ffmpeg stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

const STDERR_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything needed to open an output file.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSpec {
    pub path: PathBuf,
    pub fps: u32,
    pub size: FrameSize,
    pub container: Container,
}

/// Accepts frames in order and finalizes the output file.
pub trait VideoEncoderSink: Send {
    /// Appends one frame. The frame must match the size the sink was opened with.
    fn write(&mut self, frame: &Frame) -> Result<(), RecorderError>;

    /// Finalizes the container. Calling it again after success is a no-op.
    fn close(&mut self) -> Result<(), RecorderError>;
}

/// Opens encoder sinks.
pub trait EncoderFactory: Send + Sync {
    fn open(&self, spec: &EncoderSpec) -> Result<Box<dyn VideoEncoderSink>, RecorderError>;
}

/// Encodes through an external ffmpeg process.
#[derive(Debug, Default, Clone)]
pub struct FfmpegEncoderFactory;

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(&self, spec: &EncoderSpec) -> Result<Box<dyn VideoEncoderSink>, RecorderError> {
        Ok(Box::new(FfmpegSink::open(spec)?))
    }
}

/// ffmpeg arguments for a raw RGB24 stdin input encoded into `spec`.
pub fn encoder_args(spec: &EncoderSpec) -> Vec<String> {
    let mut args: Vec<String> = [
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(spec.size.to_string());
    args.push("-r".to_string());
    args.push(spec.fps.to_string());
    args.extend(["-i", "pipe:0"].iter().map(|s| s.to_string()));
    args.extend(spec.container.codec().ffmpeg_args().iter().map(|s| s.to_string()));
    args.extend(["-q:v", "5", "-pix_fmt", "yuv420p"].iter().map(|s| s.to_string()));
    args.push(spec.path.to_string_lossy().to_string());
    args
}

/// A running ffmpeg encode.
pub struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: StderrTail,
    size: FrameSize,
    path: PathBuf,
    frames: u64,
}

impl FfmpegSink {
    /// Spawns ffmpeg for `spec`.
    ///
    /// # Errors
    /// - `EncoderOpen` if the size is empty, the output directory cannot be created,
    ///   ffmpeg cannot be found or spawned, or it exits straight away
    pub fn open(spec: &EncoderSpec) -> Result<Self, RecorderError> {
        if spec.size.is_empty() {
            return Err(RecorderError::EncoderOpen(format!(
                "cannot encode {} frames",
                spec.size
            )));
        }
        if let Some(parent) = spec.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecorderError::EncoderOpen(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let ffmpeg = find_ffmpeg().map_err(|e| RecorderError::EncoderOpen(e.to_string()))?;
        let args = encoder_args(spec);
        tracing::debug!("Spawning encoder: {} {}", ffmpeg.display(), args.join(" "));

        let mut child = Command::new(&ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecorderError::EncoderOpen(format!("failed to start ffmpeg: {e}")))?;

        let mut stderr = match child.stderr.take().map(StderrTail::spawn) {
            Some(Ok(tail)) => tail,
            Some(Err(e)) => {
                abandon(&mut child);
                return Err(RecorderError::EncoderOpen(format!(
                    "failed to start ffmpeg stderr reader: {e}"
                )));
            }
            None => {
                abandon(&mut child);
                return Err(RecorderError::EncoderOpen("ffmpeg stderr unavailable".to_string()));
            }
        };

        thread::sleep(STARTUP_GRACE);
        if let Ok(Some(status)) = child.try_wait() {
            return Err(RecorderError::EncoderOpen(format!(
                "ffmpeg exited with {status} while opening {} ({}): {}",
                spec.path.display(),
                spec.container,
                stderr.finish()
            )));
        }

        let Some(stdin) = child.stdin.take() else {
            abandon(&mut child);
            return Err(RecorderError::EncoderOpen("ffmpeg stdin unavailable".to_string()));
        };

        tracing::info!(
            "Encoder opened: {} ({}, {} fps, {:?})",
            spec.path.display(),
            spec.size,
            spec.fps,
            spec.container.codec()
        );

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            size: spec.size,
            path: spec.path.clone(),
            frames: 0,
        })
    }
}

impl VideoEncoderSink for FfmpegSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        if frame.size() != self.size {
            return Err(RecorderError::EncoderWrite(format!(
                "frame is {} but encoder expects {}",
                frame.size(),
                self.size
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::EncoderWrite("encoder already closed".to_string()))?;
        stdin
            .write_all(frame.as_bytes())
            .map_err(|e| RecorderError::EncoderWrite(format!("ffmpeg pipe: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecorderError> {
        // Closing stdin is ffmpeg's end-of-stream signal.
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|e| RecorderError::EncoderWrite(format!("waiting for ffmpeg: {e}")))?;
        let stderr = self.stderr.finish();
        if status.success() {
            tracing::info!(
                "Video finalized: {} ({} frames)",
                self.path.display(),
                self.frames
            );
            Ok(())
        } else {
            tracing::error!("ffmpeg encode failed: {}", stderr);
            Err(RecorderError::EncoderWrite(format!(
                "ffmpeg exited with {status}: {stderr}"
            )))
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("Encoder closed during unwind: {}", e);
            }
        }
    }
}

/// Kills and reaps a child that will never be handed to a sink.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Reads ffmpeg's stderr on its own thread so a chatty encoder never stalls on a full
/// pipe. Every line is logged; the most recent ones are kept for error reports.
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl StderrTail {
    fn spawn(stderr: impl Read + Send + 'static) -> io::Result<Self> {
        let lines = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let thread_lines = Arc::clone(&lines);
        let handle = thread::Builder::new()
            .name("fluxrec-ffmpeg-stderr".to_string())
            .spawn(move || drain_lines(stderr, &thread_lines))?;
        Ok(Self {
            lines,
            handle: Some(handle),
        })
    }

    /// Waits for the pipe to reach EOF, then returns the retained lines.
    fn finish(&mut self) -> String {
        if let Some(handle) = self.handle.take() {
            // A missed deadline still leaves whatever was read so far.
            let _ = join_with_timeout(handle, STDERR_JOIN_TIMEOUT, "ffmpeg stderr");
        }
        match self.lines.lock() {
            Ok(lines) => lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        }
    }
}

fn drain_lines(reader: impl Read, tail: &Mutex<VecDeque<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!("ffmpeg: {}", line);
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("ffmpeg stderr closed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(container: Container) -> EncoderSpec {
        EncoderSpec {
            path: PathBuf::from("/tmp/out.mp4"),
            fps: 30,
            size: FrameSize::new(640, 480),
            container,
        }
    }

    #[test]
    fn test_encoder_args_mp4() {
        let args = encoder_args(&spec(Container::Mp4));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 640x480 -r 30 -i pipe:0"));
        assert!(joined.contains("-c:v mpeg4"));
        assert!(!joined.contains("xvid"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_encoder_args_xvid_tag() {
        for container in [Container::Avi, Container::Mkv] {
            let joined = encoder_args(&spec(container)).join(" ");
            assert!(joined.contains("-c:v mpeg4 -vtag xvid"), "{container}");
        }
    }

    #[test]
    fn test_stderr_tail_keeps_latest_lines() {
        let mut output = Vec::new();
        for i in 0..STDERR_TAIL_LINES + 5 {
            writeln!(output, "line {i}").unwrap();
        }
        output.extend_from_slice(b"bad \xff byte\n\n");

        let mut tail = StderrTail::spawn(io::Cursor::new(output)).unwrap();
        let text = tail.finish();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 6");
        assert_eq!(lines[STDERR_TAIL_LINES - 1], "bad \u{fffd} byte");
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_child_does_not_stall() {
        // About 1 MB of stderr, far more than a pipe buffer holds.
        let mut child = Command::new("sh")
            .args(["-c", "yes 'frame= 1 fps=30 q=5.0 size= 1kB time=00:00:01' | head -n 20000 >&2"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let mut tail = StderrTail::spawn(child.stderr.take().unwrap()).unwrap();

        assert!(child.wait().unwrap().success());
        let text = tail.finish();
        assert_eq!(text.lines().count(), STDERR_TAIL_LINES);
        assert!(text.lines().all(|l| l.starts_with("frame= 1")));
    }

    #[test]
    fn test_empty_size_rejected_before_spawn() {
        let mut bad = spec(Container::Mp4);
        bad.size = FrameSize::new(0, 480);
        assert!(matches!(
            FfmpegSink::open(&bad),
            Err(RecorderError::EncoderOpen(_))
        ));
    }
}
