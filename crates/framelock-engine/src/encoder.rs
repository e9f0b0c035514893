//! Encoders for captured export frames and audio.

use std::cell::OnceCell;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::frame::FrameBuffer;

/// A container/codec combination identified by MIME type, e.g.
/// `video/webm;codecs=vp9`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProfile {
    mime_type: String,
}

impl ExportProfile {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// `mp4` for `video/mp4;...`.
    pub fn container(&self) -> &str {
        let essence = self.mime_type.split(';').next().unwrap_or_default();
        essence.split('/').nth(1).unwrap_or_default().trim()
    }

    pub fn codec(&self) -> Option<&str> {
        self.mime_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            (key.trim() == "codecs").then(|| value.trim().trim_matches('"'))
        })
    }

    /// File extension of the artifact: `mp4` for MP4 profiles, else `webm`.
    pub fn extension(&self) -> &'static str {
        if self.container().eq_ignore_ascii_case("mp4") {
            "mp4"
        } else {
            "webm"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bits_per_second: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Turns captured RGBA frames and interleaved `f32` audio into an encoded
/// stream, delivered as byte chunks.
pub trait Encoder {
    fn is_supported(&self, profile: &ExportProfile) -> bool;

    fn start(&mut self, profile: &ExportProfile, settings: &EncoderSettings) -> Result<()>;

    fn push_video_frame(&mut self, frame: &FrameBuffer) -> Result<()>;

    fn push_audio(&mut self, samples: &[f32]) -> Result<()>;

    /// Finish the stream, handing every remaining chunk to `on_chunk`.
    fn stop(&mut self, on_chunk: &mut dyn FnMut(Vec<u8>)) -> Result<()>;
}

/// First candidate the encoder supports.
pub fn select_profile<'a, E: Encoder + ?Sized>(
    encoder: &E,
    candidates: &'a [ExportProfile],
) -> Option<&'a ExportProfile> {
    candidates.iter().find(|p| encoder.is_supported(p))
}

/// ffmpeg encoder/muxer names for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FfmpegCodecs {
    video: &'static str,
    audio: &'static str,
    muxer: &'static str,
}

fn ffmpeg_codecs(profile: &ExportProfile) -> Option<FfmpegCodecs> {
    let container = profile.container().to_ascii_lowercase();
    let codec = profile.codec().map(|c| c.to_ascii_lowercase());
    match (container.as_str(), codec.as_deref()) {
        ("mp4", None | Some("h264") | Some("avc1")) => Some(FfmpegCodecs {
            video: "libx264",
            audio: "aac",
            muxer: "mp4",
        }),
        ("webm", Some("vp9")) => Some(FfmpegCodecs {
            video: "libvpx-vp9",
            audio: "libopus",
            muxer: "webm",
        }),
        ("webm", None | Some("vp8")) => Some(FfmpegCodecs {
            video: "libvpx",
            audio: "libopus",
            muxer: "webm",
        }),
        // The WebM muxer cannot carry H.264.
        _ => None,
    }
}

struct FfmpegJob {
    dir: TempDir,
    video: BufWriter<File>,
    audio: BufWriter<File>,
    codecs: FfmpegCodecs,
    settings: EncoderSettings,
    frames: u64,
    audio_samples: u64,
}

/// Spools raw frames and PCM to a temp dir, then runs the ffmpeg CLI once
/// on `stop`.
pub struct FfmpegEncoder {
    binary: PathBuf,
    encoders: OnceCell<String>,
    job: Option<FfmpegJob>,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    const CHUNK_SIZE: usize = 64 * 1024;

    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceCell::new(),
            job: None,
        }
    }

    /// Output of `ffmpeg -encoders`, empty if ffmpeg cannot run.
    fn available_encoders(&self) -> &str {
        self.encoders.get_or_init(|| {
            match Command::new(&self.binary)
                .args(["-hide_banner", "-encoders"])
                .output()
            {
                Ok(output) if output.status.success() => {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                }
                Ok(output) => {
                    debug!("ffmpeg -encoders exited with {}", output.status);
                    String::new()
                }
                Err(e) => {
                    debug!("failed to spawn {:?}: {}", self.binary, e);
                    String::new()
                }
            }
        })
    }

    fn has_encoder(&self, name: &str) -> bool {
        self.available_encoders()
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(name))
    }

    fn job_mut(&mut self) -> Result<&mut FfmpegJob> {
        self.job
            .as_mut()
            .ok_or_else(|| EngineError::Encoder("encoder not started".to_string()))
    }
}

impl Encoder for FfmpegEncoder {
    fn is_supported(&self, profile: &ExportProfile) -> bool {
        ffmpeg_codecs(profile)
            .map(|c| self.has_encoder(c.video) && self.has_encoder(c.audio))
            .unwrap_or(false)
    }

    fn start(&mut self, profile: &ExportProfile, settings: &EncoderSettings) -> Result<()> {
        if self.job.is_some() {
            return Err(EngineError::Encoder("encoder already started".to_string()));
        }
        let codecs = ffmpeg_codecs(profile).ok_or_else(|| {
            EngineError::Encoder(format!("unsupported profile {}", profile.mime_type()))
        })?;
        let dir = tempfile::tempdir()?;
        let video = BufWriter::new(File::create(dir.path().join("video.rgba"))?);
        let audio = BufWriter::new(File::create(dir.path().join("audio.f32le"))?);
        self.job = Some(FfmpegJob {
            dir,
            video,
            audio,
            codecs,
            settings: *settings,
            frames: 0,
            audio_samples: 0,
        });
        Ok(())
    }

    fn push_video_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        let job = self.job_mut()?;
        if frame.width != job.settings.width || frame.height != job.settings.height {
            return Err(EngineError::InvalidFrame(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width, frame.height, job.settings.width, job.settings.height
            )));
        }
        job.video.write_all(&frame.data)?;
        job.frames += 1;
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> Result<()> {
        let job = self.job_mut()?;
        for sample in samples {
            job.audio.write_all(&sample.to_le_bytes())?;
        }
        job.audio_samples += samples.len() as u64;
        Ok(())
    }

    fn stop(&mut self, on_chunk: &mut dyn FnMut(Vec<u8>)) -> Result<()> {
        let mut job = self
            .job
            .take()
            .ok_or_else(|| EngineError::Encoder("encoder not started".to_string()))?;
        job.video.flush()?;
        job.audio.flush()?;
        if job.frames == 0 {
            return Err(EngineError::Encoder("no frames captured".to_string()));
        }

        let s = job.settings;
        let output_path = job.dir.path().join(format!("out.{}", job.codecs.muxer));
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgba"]);
        cmd.args(["-s", &format!("{}x{}", s.width, s.height)]);
        cmd.args(["-r", &s.fps.to_string()]);
        cmd.arg("-i").arg(job.dir.path().join("video.rgba"));
        if job.audio_samples > 0 {
            cmd.args(["-f", "f32le"]);
            cmd.args(["-ar", &s.sample_rate.to_string()]);
            cmd.args(["-ac", &s.channels.to_string()]);
            cmd.arg("-i").arg(job.dir.path().join("audio.f32le"));
            cmd.args(["-c:a", job.codecs.audio]);
        }
        cmd.args(["-c:v", job.codecs.video]);
        cmd.args(["-b:v", &s.video_bits_per_second.to_string()]);
        cmd.args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2", "-pix_fmt", "yuv420p"]);
        cmd.args(["-f", job.codecs.muxer]);
        cmd.arg(&output_path);

        let output = cmd
            .output()
            .map_err(|e| EngineError::Encoder(format!("failed to spawn ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Encoder(format!(
                "ffmpeg exited with {}: {}",
                output.status, stderr
            )));
        }

        let mut file = File::open(&output_path)?;
        let mut total = 0usize;
        loop {
            let mut chunk = vec![0u8; Self::CHUNK_SIZE];
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            chunk.truncate(n);
            total += n;
            on_chunk(chunk);
        }
        info!(frames = job.frames, bytes = total, "ffmpeg export finished");
        Ok(())
    }
}
