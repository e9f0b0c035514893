//! Media loading through the `ffprobe` and `ffmpeg` command line tools.
//!
//! Files are probed once on import. Audio is decoded whole into the mixer's
//! sample rate, stills into one RGBA frame. Video stays on disk: an
//! [`FfmpegVideo`] runs its own clock and decodes the frame for its current
//! time when asked to present.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::clock::{MonotonicClock, SystemClock};
use crate::error::ImportError;
use crate::frame::FrameBuffer;
use crate::media::{
    AudioBuffer, FrameSource, LoadedMedia, MediaFile, MediaLoader, StillImage, VideoElement,
};

/// Channels audio is decoded to.
const DECODE_CHANNELS: u16 = 2;

/// Frame rate assumed when a stream does not report one.
const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: String,
    duration: Option<String>,
}

/// What a probed file turned out to be.
#[derive(Debug, Clone, PartialEq)]
enum Probed {
    Video {
        width: u32,
        height: u32,
        fps: f64,
        duration: Option<f64>,
    },
    Image {
        width: u32,
        height: u32,
    },
    Audio,
}

/// `"30000/1001"` or `"25"` to frames per second. `0/0` is no rate.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn parse_secs(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn classify(probe: &ProbeOutput) -> Option<Probed> {
    let format = probe.format.as_ref();
    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    if let Some(stream) = video {
        let (width, height) = (stream.width?, stream.height?);
        let format_name = format.map(|f| f.format_name.as_str()).unwrap_or_default();
        // Single-picture demuxers: image2, png_pipe, jpeg_pipe, webp_pipe...
        if format_name == "image2" || format_name.ends_with("_pipe") {
            return Some(Probed::Image { width, height });
        }
        let fps = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
            .unwrap_or(FALLBACK_FPS);
        let duration = parse_secs(format.and_then(|f| f.duration.as_ref()))
            .or_else(|| parse_secs(stream.duration.as_ref()));
        return Some(Probed::Video {
            width,
            height,
            fps,
            duration,
        });
    }
    probe
        .streams
        .iter()
        .any(|s| s.codec_type == "audio")
        .then_some(Probed::Audio)
}

fn f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Run a tool and return its stdout, or stderr as the error.
fn run(cmd: &mut Command) -> Result<Vec<u8>, String> {
    let output = cmd.output().map_err(|e| format!("failed to spawn: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("exited with {}: {}", output.status, stderr.trim()));
    }
    Ok(output.stdout)
}

/// Decode the video frame shown at `time` seconds as RGBA.
fn decode_frame(
    ffmpeg: &Path,
    path: &Path,
    time: f64,
    width: u32,
    height: u32,
) -> Result<FrameBuffer, String> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-v", "error"]);
    if time > 0.0 {
        cmd.args(["-ss", &format!("{time:.6}")]);
    }
    cmd.arg("-i").arg(path);
    cmd.args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba"]);
    cmd.args(["-s", &format!("{width}x{height}"), "-"]);
    let data = run(&mut cmd)?;
    FrameBuffer::from_rgba_vec(width, height, data).map_err(|e| e.to_string())
}

/// Imports files by shelling out to ffprobe and ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegLoader {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    sample_rate: u32,
}

impl FfmpegLoader {
    /// Tools from PATH; audio is decoded at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_binaries("ffmpeg", "ffprobe", sample_rate)
    }

    pub fn with_binaries(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        sample_rate: u32,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            sample_rate: sample_rate.max(1),
        }
    }

    fn probe(&self, path: &Path) -> Result<ProbeOutput, String> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json"]);
        cmd.args(["-show_format", "-show_streams"]);
        cmd.arg(path);
        let stdout = run(&mut cmd)?;
        serde_json::from_slice(&stdout).map_err(|e| format!("unreadable probe output: {e}"))
    }

    fn decode_audio(&self, path: &Path) -> Result<AudioBuffer, String> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error"]);
        cmd.arg("-i").arg(path);
        cmd.args(["-vn", "-f", "f32le"]);
        cmd.args(["-ac", &DECODE_CHANNELS.to_string()]);
        cmd.args(["-ar", &self.sample_rate.to_string(), "-"]);
        let pcm = run(&mut cmd)?;
        Ok(AudioBuffer::new(
            self.sample_rate,
            DECODE_CHANNELS,
            f32_samples(&pcm),
        ))
    }
}

impl MediaLoader for FfmpegLoader {
    type Element = FfmpegVideo;

    fn load(&mut self, file: &MediaFile) -> Result<LoadedMedia<FfmpegVideo>, ImportError> {
        let failed = |reason: String| ImportError::LoadFailed {
            name: file.name.clone(),
            reason,
        };
        let probe = self.probe(&file.path).map_err(failed)?;
        let Some(probed) = classify(&probe) else {
            return Err(ImportError::Unsupported(file.name.clone()));
        };
        debug!(file = %file.name, ?probed, "probed");
        match probed {
            Probed::Video {
                width,
                height,
                fps,
                duration,
            } => {
                let mut element = FfmpegVideo::new(
                    self.ffmpeg.clone(),
                    file.path.clone(),
                    (width, height),
                    fps,
                    duration,
                );
                element.present();
                if element.current_frame().is_none() {
                    return Err(failed("could not decode the first frame".to_string()));
                }
                Ok(LoadedMedia::Video(element))
            }
            Probed::Image { width, height } => {
                let frame = decode_frame(&self.ffmpeg, &file.path, 0.0, width, height)
                    .map_err(failed)?;
                Ok(LoadedMedia::Image(StillImage::new(frame)))
            }
            Probed::Audio => Ok(LoadedMedia::Audio(
                self.decode_audio(&file.path).map_err(failed)?,
            )),
        }
    }
}

/// A video file presented frame by frame, decoded on demand.
#[derive(Debug)]
pub struct FfmpegVideo {
    ffmpeg: PathBuf,
    path: PathBuf,
    size: (u32, u32),
    fps: f64,
    duration: Option<f64>,
    clock: SystemClock,
    /// Media time at the last seek, play, pause or rate change.
    anchor: f64,
    /// Clock reading at which the element last started running.
    running_since: Option<f64>,
    rate: f64,
    frame: Option<FrameBuffer>,
    frame_index: Option<u64>,
}

impl FfmpegVideo {
    fn new(
        ffmpeg: PathBuf,
        path: PathBuf,
        size: (u32, u32),
        fps: f64,
        duration: Option<f64>,
    ) -> Self {
        Self {
            ffmpeg,
            path,
            size,
            fps,
            duration,
            clock: SystemClock::start(),
            anchor: 0.0,
            running_since: None,
            rate: 1.0,
            frame: None,
            frame_index: None,
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    fn clamp(&self, time: f64) -> f64 {
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        match self.duration {
            Some(d) => time.min(d),
            None => time,
        }
    }

    /// Fold elapsed running time into the anchor.
    fn rebase(&mut self) {
        self.anchor = self.current_time();
        if self.running_since.is_some() {
            self.running_since = Some(self.clock.now());
        }
    }
}

impl FrameSource for FfmpegVideo {
    fn natural_size(&self) -> (u32, u32) {
        self.size
    }

    fn current_frame(&self) -> Option<&FrameBuffer> {
        self.frame.as_ref()
    }
}

impl VideoElement for FfmpegVideo {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn current_time(&self) -> f64 {
        let elapsed = self
            .running_since
            .map(|since| (self.clock.now() - since) * self.rate)
            .unwrap_or(0.0);
        self.clamp(self.anchor + elapsed)
    }

    fn seek(&mut self, time: f64) {
        self.anchor = self.clamp(time);
        if self.running_since.is_some() {
            self.running_since = Some(self.clock.now());
        }
    }

    fn play(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(self.clock.now());
        }
    }

    fn pause(&mut self) {
        self.anchor = self.current_time();
        self.running_since = None;
    }

    fn is_paused(&self) -> bool {
        self.running_since.is_none()
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if rate > 0.0 && rate.is_finite() {
            self.rebase();
            self.rate = rate;
        }
    }

    fn present(&mut self) {
        let time = self.current_time();
        let index = (time * self.fps).floor() as u64;
        if self.frame_index == Some(index) {
            return;
        }
        let (width, height) = self.size;
        match decode_frame(&self.ffmpeg, &self.path, index as f64 / self.fps, width, height) {
            Ok(frame) => {
                self.frame = Some(frame);
                self.frame_index = Some(index);
            }
            Err(e) => warn!(path = ?self.path, time, "frame decode failed: {}", e),
        }
    }
}
