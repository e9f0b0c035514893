//! Export state machine: Idle until started, Rendering until the watcher
//! sees the end of the window, a cancel, or playback stopping.

use tracing::{debug, error, info};

use crate::clock::Cadence;
use crate::config::ExportConfig;
use crate::encoder::{Encoder, EncoderSettings, ExportProfile, select_profile};
use crate::error::{EngineError, Result};
use crate::frame::FrameBuffer;

/// Rounding slack when converting seconds to frame counts.
const FRAME_SLACK: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    ReachedEnd,
    Cancelled,
    PlaybackStopped,
}

/// The finished file, assembled from the encoder's chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub chunks: usize,
    pub frames: u64,
    pub audio_samples: u64,
    pub reason: FinishReason,
}

struct ExportJob {
    encoder: Box<dyn Encoder>,
    profile: ExportProfile,
    fps: f64,
    /// Frames covering exactly the exported span.
    frame_limit: u64,
    watch_cadence: Cadence,
    cancel_requested: bool,
    frames: u64,
    audio_samples: u64,
    /// Interleaved samples covering exactly the exported span.
    audio_limit: u64,
}

pub struct ExportDriver {
    config: ExportConfig,
    job: Option<ExportJob>,
}

impl ExportDriver {
    pub fn new(config: ExportConfig) -> Self {
        Self { config, job: None }
    }

    pub fn state(&self) -> ExportState {
        if self.job.is_some() {
            ExportState::Rendering
        } else {
            ExportState::Idle
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.job.is_some()
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn profiles(&self) -> Vec<ExportProfile> {
        self.config.profiles.iter().map(ExportProfile::new).collect()
    }

    /// The profile of the running export.
    pub fn profile(&self) -> Option<&ExportProfile> {
        self.job.as_ref().map(|j| &j.profile)
    }

    pub fn frames_captured(&self) -> u64 {
        self.job.as_ref().map(|j| j.frames).unwrap_or(0)
    }

    /// Pick a profile and start the encoder for a span of `duration`
    /// seconds. Nothing is started if no profile is supported.
    pub fn begin(
        &mut self,
        mut encoder: Box<dyn Encoder>,
        settings: EncoderSettings,
        duration: f64,
    ) -> Result<ExportProfile> {
        if self.job.is_some() {
            return Err(EngineError::ExportInProgress);
        }
        let profiles = self.profiles();
        let profile = select_profile(encoder.as_ref(), &profiles)
            .cloned()
            .ok_or_else(|| EngineError::NoSupportedProfile {
                candidates: self.config.profiles.join(", "),
            })?;
        encoder.start(&profile, &settings)?;

        let duration = duration.max(0.0);
        let fps = f64::from(settings.fps.max(1));
        let audio_frames = (duration * f64::from(settings.sample_rate)).round() as u64;
        info!(
            profile = profile.mime_type(),
            duration,
            fps = settings.fps,
            "export started"
        );
        self.job = Some(ExportJob {
            encoder,
            profile: profile.clone(),
            fps,
            frame_limit: (duration * fps - FRAME_SLACK).ceil().max(0.0) as u64,
            watch_cadence: Cadence::new(self.config.poll_interval),
            cancel_requested: false,
            frames: 0,
            audio_samples: 0,
            audio_limit: audio_frames * u64::from(settings.channels),
        });
        Ok(profile)
    }

    /// Push `canvas` once for every frame due by `elapsed` seconds into
    /// the span. Frame `k` is due at `k / fps`; a late call repeats the
    /// canvas so the video keeps pace with the audio. Returns the number
    /// of frames pushed.
    pub fn capture_frames(&mut self, canvas: &FrameBuffer, elapsed: f64) -> Result<u64> {
        let job = self.job.as_mut().ok_or(EngineError::NotExporting)?;
        if elapsed.is_nan() || elapsed < 0.0 {
            return Ok(0);
        }
        let due = ((elapsed * job.fps + FRAME_SLACK).floor() as u64)
            .saturating_add(1)
            .min(job.frame_limit);
        let mut pushed = 0;
        while job.frames < due {
            job.encoder.push_video_frame(canvas)?;
            job.frames += 1;
            pushed += 1;
        }
        if pushed > 1 {
            debug!(pushed, frames = job.frames, "caught up on late frames");
        }
        Ok(pushed)
    }

    /// Push captured audio, dropping anything past the exported span.
    pub fn capture_audio(&mut self, samples: &[f32]) -> Result<()> {
        let job = self.job.as_mut().ok_or(EngineError::NotExporting)?;
        let room = job.audio_limit.saturating_sub(job.audio_samples) as usize;
        let take = samples.len().min(room);
        if take == 0 {
            return Ok(());
        }
        job.encoder.push_audio(&samples[..take])?;
        job.audio_samples += take as u64;
        Ok(())
    }

    pub fn request_cancel(&mut self) {
        if let Some(job) = self.job.as_mut() {
            job.cancel_requested = true;
        }
    }

    /// The end-of-window watcher. Runs at the poll interval; a cancel is
    /// noticed on the next call.
    pub fn check(
        &mut self,
        now: f64,
        position: f64,
        project_end: f64,
        playing: bool,
    ) -> Option<FinishReason> {
        let job = self.job.as_mut()?;
        if job.cancel_requested {
            return Some(FinishReason::Cancelled);
        }
        if !job.watch_cadence.should_tick(now) {
            return None;
        }
        if position >= project_end {
            Some(FinishReason::ReachedEnd)
        } else if !playing {
            Some(FinishReason::PlaybackStopped)
        } else {
            None
        }
    }

    /// Stop the encoder and assemble the artifact. The driver is Idle
    /// afterwards whether or not encoding succeeded.
    pub fn finish(&mut self, reason: FinishReason) -> Result<ExportArtifact> {
        let mut job = self.job.take().ok_or(EngineError::NotExporting)?;
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        if let Err(e) = job.encoder.stop(&mut |chunk| chunks.push(chunk)) {
            error!("export failed while finalizing: {}", e);
            return Err(e);
        }
        let file_name = format!("{}.{}", self.config.file_stem, job.profile.extension());
        let artifact = ExportArtifact {
            file_name,
            mime_type: job.profile.mime_type().to_string(),
            chunks: chunks.len(),
            bytes: chunks.concat(),
            frames: job.frames,
            audio_samples: job.audio_samples,
            reason,
        };
        info!(
            file = %artifact.file_name,
            bytes = artifact.bytes.len(),
            frames = artifact.frames,
            ?reason,
            "export finished"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts MP4 only and discards its input.
    #[derive(Default)]
    struct NullEncoder;

    impl Encoder for NullEncoder {
        fn is_supported(&self, profile: &ExportProfile) -> bool {
            profile.container() == "mp4"
        }

        fn start(&mut self, _: &ExportProfile, _: &EncoderSettings) -> Result<()> {
            Ok(())
        }

        fn push_video_frame(&mut self, _: &FrameBuffer) -> Result<()> {
            Ok(())
        }

        fn push_audio(&mut self, _: &[f32]) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self, on_chunk: &mut dyn FnMut(Vec<u8>)) -> Result<()> {
            on_chunk(vec![1, 2]);
            on_chunk(vec![3]);
            Ok(())
        }
    }

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 4,
            height: 4,
            fps: 10,
            video_bits_per_second: 1_000_000,
            sample_rate: 100,
            channels: 2,
        }
    }

    fn started(duration: f64) -> ExportDriver {
        let mut driver = ExportDriver::new(ExportConfig::default());
        driver
            .begin(Box::new(NullEncoder::default()), settings(), duration)
            .unwrap();
        driver
    }

    #[test]
    fn test_begin_picks_first_supported_profile() {
        let driver = started(1.0);
        assert_eq!(driver.state(), ExportState::Rendering);
        assert_eq!(driver.profile().unwrap().mime_type(), "video/mp4");
    }

    #[test]
    fn test_frames_follow_elapsed_time() {
        let mut driver = started(1.0);
        let canvas = FrameBuffer::new(4, 4);
        assert_eq!(driver.capture_frames(&canvas, 0.0).unwrap(), 1);
        assert_eq!(driver.capture_frames(&canvas, 0.05).unwrap(), 0);
        assert_eq!(driver.capture_frames(&canvas, 0.1).unwrap(), 1);
        assert_eq!(driver.capture_frames(&canvas, 0.3).unwrap(), 2);
        assert_eq!(driver.frames_captured(), 4);
    }

    #[test]
    fn test_late_frames_fill_the_span_exactly() {
        let mut driver = started(1.0);
        let canvas = FrameBuffer::new(4, 4);
        driver.capture_frames(&canvas, 0.0).unwrap();
        assert_eq!(driver.capture_frames(&canvas, 0.75).unwrap(), 7);
        assert_eq!(driver.capture_frames(&canvas, 2.0).unwrap(), 2);
        assert_eq!(driver.capture_frames(&canvas, 3.0).unwrap(), 0);
        let artifact = driver.finish(FinishReason::ReachedEnd).unwrap();
        assert_eq!(artifact.frames, 10);
    }

    #[test]
    fn test_audio_is_capped_to_span() {
        let mut driver = started(1.0);
        driver.capture_audio(&[0.0; 150]).unwrap();
        driver.capture_audio(&[0.0; 150]).unwrap();
        let artifact = driver.finish(FinishReason::ReachedEnd).unwrap();
        assert_eq!(artifact.audio_samples, 200);
    }

    #[test]
    fn test_cancel_is_seen_before_poll_interval() {
        let mut driver = started(5.0);
        assert_eq!(driver.check(0.0, 0.0, 5.0, true), None);
        driver.request_cancel();
        assert_eq!(
            driver.check(0.01, 0.01, 5.0, true),
            Some(FinishReason::Cancelled)
        );
    }

    #[test]
    fn test_watcher_polls_at_interval() {
        let mut driver = started(1.0);
        assert_eq!(driver.check(0.0, 0.0, 1.0, true), None);
        // Stopped playback is only noticed on the next poll.
        assert_eq!(driver.check(0.05, 0.05, 1.0, false), None);
        assert_eq!(
            driver.check(0.1, 0.05, 1.0, false),
            Some(FinishReason::PlaybackStopped)
        );
    }

    #[test]
    fn test_finish_concatenates_chunks_and_goes_idle() {
        let mut driver = started(1.0);
        let artifact = driver.finish(FinishReason::ReachedEnd).unwrap();
        assert_eq!(artifact.bytes, vec![1, 2, 3]);
        assert_eq!(artifact.chunks, 2);
        assert_eq!(artifact.file_name, "my_movie.mp4");
        assert!(!driver.is_rendering());
        assert!(matches!(
            driver.finish(FinishReason::ReachedEnd),
            Err(EngineError::NotExporting)
        ));
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut driver = started(1.0);
        let err = driver
            .begin(Box::new(NullEncoder::default()), settings(), 1.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::ExportInProgress));
    }
}
