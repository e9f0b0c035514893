//! Keeps video elements in step with the playback clock.
//!
//! Elements run on their own clocks; each tick they are compared with the
//! source time the model expects and corrected only when the drift is over
//! the mode's tolerance.

use std::collections::HashMap;

use tracing::trace;

use framelock_core::clip::ClipKind;
use framelock_core::media::MediaId;
use framelock_core::time::source_time;
use framelock_core::timeline::ProjectState;

use crate::config::SyncConfig;
use crate::media::{MediaPool, VideoElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Normal playback: elements play freely within the loose tolerance.
    Playing,
    /// Paused, scrubbing or exporting: elements are paused and held to the
    /// exact source time.
    Exact,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub seeked: Vec<MediaId>,
    pub resumed: Vec<MediaId>,
    pub paused: Vec<MediaId>,
}

#[derive(Debug, Clone)]
pub struct VideoSync {
    config: SyncConfig,
}

impl VideoSync {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn tolerance(&self, mode: SyncMode) -> f64 {
        match mode {
            SyncMode::Playing => self.config.playing_tolerance,
            SyncMode::Exact => self.config.exact_tolerance,
        }
    }

    /// Align every video element with the timeline at `position`.
    ///
    /// Elements whose clip is not active are paused. When several active
    /// clips share one element the highest track wins, matching draw order.
    pub fn reconcile<V: VideoElement>(
        &self,
        state: &ProjectState,
        media: &mut MediaPool<V>,
        position: f64,
        mode: SyncMode,
    ) -> SyncReport {
        let mut targets: HashMap<MediaId, (f64, f64)> = HashMap::new();
        for (_, track) in state.timeline.video_tracks() {
            if let Some(clip) = track.active_clip(position) {
                if matches!(clip.kind, ClipKind::Video(_)) {
                    targets.insert(clip.media, (source_time(clip, position), clip.playback_rate));
                }
            }
        }

        let tolerance = self.tolerance(mode);
        let mut report = SyncReport::default();
        for (id, element) in media.videos_mut() {
            let Some(&(target, rate)) = targets.get(&id) else {
                if !element.is_paused() {
                    element.pause();
                    report.paused.push(id);
                }
                continue;
            };

            if element.playback_rate() != rate {
                element.set_playback_rate(rate);
            }
            let drift = (element.current_time() - target).abs();
            match mode {
                SyncMode::Playing => {
                    if drift > tolerance {
                        trace!(media = %id, drift, target, "correcting drift");
                        element.seek(target);
                        report.seeked.push(id);
                    }
                    if element.is_paused() {
                        element.play();
                        report.resumed.push(id);
                    }
                }
                SyncMode::Exact => {
                    if !element.is_paused() {
                        element.pause();
                        report.paused.push(id);
                    }
                    if drift > tolerance {
                        element.seek(target);
                        report.seeked.push(id);
                    }
                }
            }
            element.present();
        }
        report
    }
}
