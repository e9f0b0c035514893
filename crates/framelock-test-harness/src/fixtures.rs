use std::f64::consts::TAU;
use std::process::{Command, Stdio};

use framelock_engine::frame::FrameBuffer;
use framelock_engine::media::AudioBuffer;

/// Whether an `ffmpeg` binary is on PATH. Tests that encode for real skip
/// themselves when it is not.
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether both `ffmpeg` and `ffprobe` are on PATH, for tests that import
/// real files.
pub fn ffmpeg_tools_available() -> bool {
    ffmpeg_available()
        && Command::new("ffprobe")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
}

/// Mono sine at `frequency` Hz, amplitude 0.5.
pub fn sine_buffer(frequency: f64, seconds: f64, sample_rate: u32) -> AudioBuffer {
    let frames = (seconds * f64::from(sample_rate)).round() as usize;
    let samples = (0..frames)
        .map(|i| (0.5 * (TAU * frequency * i as f64 / f64::from(sample_rate)).sin()) as f32)
        .collect();
    AudioBuffer::new(sample_rate, 1, samples)
}

/// Mono buffer holding one constant value, handy for checking gains.
pub fn constant_buffer(value: f32, seconds: f64, sample_rate: u32) -> AudioBuffer {
    let frames = (seconds * f64::from(sample_rate)).round() as usize;
    AudioBuffer::new(sample_rate, 1, vec![value; frames])
}

pub fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> FrameBuffer {
    FrameBuffer::solid(width, height, rgba)
}

/// Get a temporary directory for test fixtures that persists for the test run.
pub fn fixture_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("failed to create temp dir for fixtures")
}
