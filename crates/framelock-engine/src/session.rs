//! The editing/playback session: one model, one clock, one audio graph.
//!
//! All time flows from the `now` passed into each call. A tick reads the
//! playhead once and drives video sync, composition and export capture from
//! that single position.

use tracing::{debug, error, info, warn};

use framelock_core::clip::Clip;
use framelock_core::commands::{Applied, Intent};
use framelock_core::gesture::SelectionOverlay;
use framelock_core::timeline::ProjectState;

use crate::clock::PlaybackClock;
use crate::compositor::Compositor;
use crate::config::EngineConfig;
use crate::encoder::{Encoder, EncoderSettings, ExportProfile};
use crate::error::{EngineError, ImportError, Result};
use crate::export::{ExportArtifact, ExportDriver, ExportState, FinishReason};
use crate::frame::FrameBuffer;
use crate::graph::{AudioGraph, Destination};
use crate::media::{MediaFile, MediaLoader, MediaPool, VideoElement};
use crate::scheduler::AudioScheduler;
use crate::video_sync::{SyncMode, SyncReport, VideoSync};

/// Slack for comparing the playhead with the window end.
const END_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transport {
    Play,
    Pause,
    Toggle,
    Seek(f64),
    ToStart,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub added: Vec<Clip>,
    pub skipped: Vec<ImportError>,
}

#[derive(Debug)]
pub struct TickReport {
    pub position: f64,
    pub sync: SyncReport,
    /// Set on the tick an export finishes.
    pub export: Option<Result<ExportArtifact>>,
}

pub struct Session<G: AudioGraph, V: VideoElement> {
    state: ProjectState,
    media: MediaPool<V>,
    graph: G,
    clock: PlaybackClock,
    scheduler: AudioScheduler,
    video_sync: VideoSync,
    compositor: Compositor,
    canvas: FrameBuffer,
    overlay: Option<SelectionOverlay>,
    export: ExportDriver,
    capture: Option<Destination>,
    config: EngineConfig,
}

impl<G: AudioGraph, V: VideoElement> Session<G, V> {
    pub fn new(config: EngineConfig, graph: G) -> Self {
        let state = ProjectState::new();
        let compositor = Compositor::new(config.canvas);
        Self {
            clock: PlaybackClock::new(state.project.start()),
            state,
            media: MediaPool::new(),
            graph,
            scheduler: AudioScheduler::new(config.audio),
            video_sync: VideoSync::new(config.sync),
            canvas: compositor.new_canvas(),
            compositor,
            overlay: None,
            export: ExportDriver::new(config.export.clone()),
            capture: None,
            config,
        }
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn media(&self) -> &MediaPool<V> {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut MediaPool<V> {
        &mut self.media
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn scheduler(&self) -> &AudioScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn canvas(&self) -> &FrameBuffer {
        &self.canvas
    }

    /// Where the selected clip was last drawn, for transform hit-testing.
    pub fn overlay(&self) -> Option<&SelectionOverlay> {
        self.overlay.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn export_state(&self) -> ExportState {
        self.export.state()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn position(&self, now: f64) -> f64 {
        self.clock.position(now)
    }

    /// Load each file and append a clip for it on its default track.
    /// Files that fail to load are skipped; the rest still import.
    pub fn import<L: MediaLoader<Element = V>>(
        &mut self,
        loader: &mut L,
        files: &[MediaFile],
    ) -> ImportReport {
        let mut report = ImportReport::default();
        for file in files {
            let loaded = match loader.load(file) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(file = %file.name, "skipping import: {}", e);
                    report.skipped.push(e);
                    continue;
                }
            };
            let (media, info) = self.media.insert(file.name.clone(), loaded);
            let clip = Clip::from_media(media, &info);
            match self.state.apply(Intent::AppendClip { clip }) {
                Ok(Applied::ClipAdded(id)) => {
                    if let Some(clip) = self.state.clip(id) {
                        debug!(file = %file.name, clip = %id, start = clip.start, "imported");
                        report.added.push(clip.clone());
                    }
                }
                Ok(other) => debug!(?other, "unexpected import result"),
                Err(e) => {
                    warn!(file = %file.name, "skipping import: {}", e);
                    self.media.remove(media);
                    report.skipped.push(ImportError::LoadFailed {
                        name: file.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Apply an edit. Media no clip references any more is released, and
    /// audio is rescheduled if the edit lands during playback.
    ///
    /// A playhead left outside a moved window is brought back into it:
    /// past the end stops at the start, before the start jumps to it.
    pub fn dispatch(&mut self, intent: Intent, now: f64) -> Result<Applied> {
        let reschedule = !matches!(
            intent,
            Intent::Select { .. } | Intent::SetZoom { .. } | Intent::SetSnap { .. }
        );
        let applied = self.state.apply(intent)?;
        if let Applied::ClipDeleted(clip) = &applied {
            if self.state.timeline.clips_using_media(clip.media) == 0 {
                self.media.remove(clip.media);
                debug!(media = %clip.media, "released media");
            }
        }
        if self.clock.is_playing() && !self.export.is_rendering() {
            let window = self.state.project.window();
            let position = self.clock.position(now);
            if position + END_EPSILON >= window.end {
                self.stop_at_start();
            } else if position < window.start {
                self.clock.seek(window.start, now);
                debug!(from = position, to = window.start, "playhead moved into window");
                self.restart_audio(now);
            } else if reschedule {
                self.restart_audio(now);
            }
        }
        Ok(applied)
    }

    pub fn transport(&mut self, command: Transport, now: f64) {
        if self.export.is_rendering() {
            // Stopping playback ends the export on the next watcher pass.
            match command {
                Transport::Pause | Transport::Toggle => self.pause(now),
                _ => warn!(?command, "transport ignored while exporting"),
            }
            return;
        }
        match command {
            Transport::Play => self.play(now),
            Transport::Pause => self.pause(now),
            Transport::Toggle => {
                if self.clock.is_playing() {
                    self.pause(now);
                } else {
                    self.play(now);
                }
            }
            Transport::Seek(t) => self.seek(t, now),
            Transport::ToStart => self.stop_at_start(),
        }
    }

    fn play(&mut self, now: f64) {
        if self.clock.is_playing() {
            return;
        }
        let window = self.state.project.window();
        let position = self.clock.position(now);
        if position < window.start || position + END_EPSILON >= window.end {
            self.clock.seek(window.start, now);
        }
        self.clock.play(now);
        self.restart_audio(now);
        debug!(position = self.clock.position(now), "playing");
    }

    fn pause(&mut self, now: f64) {
        self.clock.pause(now);
        self.scheduler.stop_all(&mut self.graph);
        debug!(position = self.clock.position(now), "paused");
    }

    fn seek(&mut self, t: f64, now: f64) {
        let target = self.state.project.clamp_position(t);
        self.clock.seek(target, now);
        if self.clock.is_playing() {
            if target + END_EPSILON >= self.state.project.end() {
                self.stop_at_start();
            } else {
                self.restart_audio(now);
            }
        }
    }

    fn stop_at_start(&mut self) {
        self.clock.stop_at(self.state.project.start());
        self.scheduler.stop_all(&mut self.graph);
        debug!("stopped at window start");
    }

    fn restart_audio(&mut self, now: f64) {
        self.graph.render_until(now);
        let position = self.clock.position(now);
        let destination = self.capture.unwrap_or(Destination::Speakers);
        self.scheduler.restart(
            &mut self.graph,
            &self.state,
            &self.media,
            position,
            destination,
        );
    }

    /// Advance to `now`: sync video, draw the canvas and feed any export.
    pub fn tick(&mut self, now: f64) -> TickReport {
        self.graph.render_until(now);
        let exporting = self.export.is_rendering();
        let mut position = self.clock.position(now);
        if self.clock.is_playing() && !exporting && position + END_EPSILON >= self.state.project.end() {
            self.stop_at_start();
            position = self.state.project.start();
        }

        let mode = if exporting || !self.clock.is_playing() {
            SyncMode::Exact
        } else {
            SyncMode::Playing
        };
        let sync = self
            .video_sync
            .reconcile(&self.state, &mut self.media, position, mode);
        // Past the window end an export keeps the last frame it drew.
        if !(exporting && position + END_EPSILON >= self.state.project.end()) {
            self.overlay = self
                .compositor
                .draw_frame(&self.state, &self.media, position, &mut self.canvas);
        }

        let export = if exporting {
            self.drive_export(now, position)
        } else {
            None
        };
        TickReport {
            position,
            sync,
            export,
        }
    }

    fn drive_export(&mut self, now: f64, position: f64) -> Option<Result<ExportArtifact>> {
        let window = self.state.project.window();
        if let Some(capture) = self.capture {
            let samples = self.graph.take_captured(capture);
            if let Err(e) = self.export.capture_audio(&samples) {
                return Some(self.abort_export(e));
            }
        }
        if let Err(e) = self.export.capture_frames(&self.canvas, position - window.start) {
            return Some(self.abort_export(e));
        }
        let end = window.end;
        let reason = self
            .export
            .check(now, position, end, self.clock.is_playing())?;
        self.teardown_export();
        Some(self.export.finish(reason))
    }

    fn teardown_export(&mut self) {
        self.scheduler.stop_all(&mut self.graph);
        if let Some(capture) = self.capture.take() {
            self.graph.close_capture(capture);
        }
        self.clock.stop_at(self.state.project.start());
    }

    fn abort_export(&mut self, error: EngineError) -> Result<ExportArtifact> {
        error!("export aborted: {}", error);
        self.teardown_export();
        if let Err(e) = self.export.finish(FinishReason::Cancelled) {
            debug!("discarding partial export: {}", e);
        }
        Err(error)
    }

    /// Start rendering the project window in real time from `now`.
    ///
    /// Playback is paused and rewound first. Fails without capturing
    /// anything if the encoder supports none of the configured profiles.
    pub fn start_export(&mut self, encoder: Box<dyn Encoder>, now: f64) -> Result<ExportProfile> {
        if self.export.is_rendering() {
            return Err(EngineError::ExportInProgress);
        }
        self.scheduler.stop_all(&mut self.graph);
        self.clock.stop_at(self.state.project.start());

        let (width, height) = self.compositor.size();
        let settings = EncoderSettings {
            width,
            height,
            fps: self.config.export.capture_fps,
            video_bits_per_second: self.config.export.video_bits_per_second,
            sample_rate: self.graph.sample_rate(),
            channels: self.graph.channels(),
        };
        let profile = self
            .export
            .begin(encoder, settings, self.state.project.duration())?;

        self.graph.render_until(now);
        self.capture = Some(self.graph.create_capture());
        self.clock.play(now);
        self.restart_audio(now);
        info!(
            start = self.state.project.start(),
            end = self.state.project.end(),
            "rendering export"
        );
        Ok(profile)
    }

    /// Finalize the running export on the next tick with what was captured.
    pub fn cancel_export(&mut self) {
        self.export.request_cancel();
    }

    /// Render the whole window on synthetic time, one tick per frame.
    pub fn export_offline(&mut self, encoder: Box<dyn Encoder>, now: f64) -> Result<ExportArtifact> {
        self.start_export(encoder, now)?;
        let fps = f64::from(self.config.export.capture_fps.max(1));
        let span = self.state.project.duration() + 2.0 * self.config.export.poll_interval + 1.0;
        let budget = (span * fps).ceil() as u64;
        for k in 0..=budget {
            let t = now + k as f64 / fps;
            if let Some(result) = self.tick(t).export {
                return result;
            }
        }
        let error = EngineError::ExportStalled { ticks: budget + 1 };
        self.abort_export(error)
    }
}
