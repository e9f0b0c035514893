use crate::clip::{Clip, ClipId};
use crate::error::{CoreError, Result};
use crate::media::{MediaId, MediaKind};
use crate::time::TimeRange;

pub const VIDEO_TRACK_COUNT: usize = 3;
pub const AUDIO_TRACK_COUNT: usize = 2;

/// Imported video and stills land on the topmost video track.
pub const DEFAULT_VIDEO_TRACK: usize = VIDEO_TRACK_COUNT - 1;
/// Imported audio lands on the first audio track.
pub const DEFAULT_AUDIO_TRACK: usize = VIDEO_TRACK_COUNT;

/// Smallest allowed project window, in seconds.
pub const MIN_PROJECT_SPAN: f64 = 1.0;
pub const DEFAULT_PROJECT_END: f64 = 30.0;

pub const DEFAULT_PX_PER_SEC: f64 = 30.0;
pub const MIN_PX_PER_SEC: f64 = 5.0;
pub const MAX_PX_PER_SEC: f64 = 400.0;

/// Whether a track holds visual or audio clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn accepts(self, media: MediaKind) -> bool {
        media.track_kind() == self
    }
}

/// A track holding clips in insertion order. Clips may overlap in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub kind: TrackKind,
    pub clips: Vec<Clip>,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            clips: Vec::new(),
        }
    }

    pub fn video(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Video)
    }

    pub fn audio(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Audio)
    }

    /// Append a clip after checking its kind fits this track.
    pub fn push_clip(&mut self, clip: Clip) -> Result<()> {
        self.check_accepts(clip.media_kind())?;
        self.clips.push(clip);
        Ok(())
    }

    pub fn check_accepts(&self, media: MediaKind) -> Result<()> {
        if self.kind.accepts(media) {
            Ok(())
        } else {
            Err(CoreError::IncompatibleTrack {
                media,
                track: self.kind,
            })
        }
    }

    pub fn remove_clip(&mut self, clip_id: ClipId) -> Result<Clip> {
        let idx = self
            .clips
            .iter()
            .position(|c| c.id == clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        Ok(self.clips.remove(idx))
    }

    pub fn get_clip(&self, clip_id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    pub fn get_clip_mut(&mut self, clip_id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == clip_id)
    }

    /// The clip playing at `t`. When clips overlap the earliest-added wins.
    pub fn active_clip(&self, t: f64) -> Option<&Clip> {
        self.clips.iter().find(|c| c.is_active_at(t))
    }

    /// End of the last clip in insertion order, where the next import goes.
    pub fn end_position(&self) -> f64 {
        self.clips.last().map(|c| c.end()).unwrap_or(0.0)
    }
}

/// The fixed set of tracks. Indices `0..VIDEO_TRACK_COUNT` are video tracks,
/// composited low to high; the rest are audio tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    tracks: Vec<Track>,
}

impl Timeline {
    pub fn new() -> Self {
        let mut tracks = Vec::with_capacity(VIDEO_TRACK_COUNT + AUDIO_TRACK_COUNT);
        for i in 0..VIDEO_TRACK_COUNT {
            tracks.push(Track::video(format!("Video {}", i + 1)));
        }
        for i in 0..AUDIO_TRACK_COUNT {
            tracks.push(Track::audio(format!("Audio {}", i + 1)));
        }
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Mutable access to the tracks; the slice cannot grow or shrink.
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn track(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(CoreError::TrackNotFound(index))
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        self.tracks
            .get_mut(index)
            .ok_or(CoreError::TrackNotFound(index))
    }

    /// Video tracks with their indices, bottom to top.
    pub fn video_tracks(&self) -> impl Iterator<Item = (usize, &Track)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = (usize, &Track)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TrackKind::Audio)
    }

    pub fn default_track_for(media: MediaKind) -> usize {
        match media.track_kind() {
            TrackKind::Video => DEFAULT_VIDEO_TRACK,
            TrackKind::Audio => DEFAULT_AUDIO_TRACK,
        }
    }

    /// Find a clip anywhere on the timeline, returning its track index.
    pub fn find_clip(&self, clip_id: ClipId) -> Option<(usize, &Clip)> {
        self.tracks
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.get_clip(clip_id).map(|c| (i, c)))
    }

    pub fn find_clip_mut(&mut self, clip_id: ClipId) -> Option<(usize, &mut Clip)> {
        self.tracks
            .iter_mut()
            .enumerate()
            .find_map(|(i, t)| t.get_clip_mut(clip_id).map(|c| (i, c)))
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|t| t.clips.iter())
    }

    /// Number of clips referencing a media resource.
    pub fn clips_using_media(&self, media: MediaId) -> usize {
        self.clips().filter(|c| c.media == media).count()
    }

    /// End of the last clip across all tracks.
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter().map(|c| c.end()))
            .fold(0.0, f64::max)
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    pub enabled: bool,
    pub grid_size: f64,
}

impl Default for Snap {
    fn default() -> Self {
        Self {
            enabled: false,
            grid_size: 1.0,
        }
    }
}

impl Snap {
    /// Round `t` to the grid when snapping is on.
    pub fn apply(&self, t: f64) -> f64 {
        if self.enabled && self.grid_size > 0.0 {
            (t / self.grid_size).round() * self.grid_size
        } else {
            t
        }
    }
}

/// Project-level timing window and view settings.
///
/// The window is kept at least `MIN_PROJECT_SPAN` long by clamping every
/// mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    start: f64,
    end: f64,
    px_per_sec: f64,
    snap: Snap,
}

impl Project {
    pub fn new() -> Self {
        Self {
            start: 0.0,
            end: DEFAULT_PROJECT_END,
            px_per_sec: DEFAULT_PX_PER_SEC,
            snap: Snap::default(),
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn window(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn px_per_sec(&self) -> f64 {
        self.px_per_sec
    }

    pub fn snap(&self) -> Snap {
        self.snap
    }

    /// Set the playable window, clamping `start >= 0` and
    /// `end >= start + MIN_PROJECT_SPAN`.
    pub fn set_range(&mut self, start: f64, end: f64) -> Result<()> {
        if !start.is_finite() || !end.is_finite() {
            return Err(CoreError::InvalidProjectRange { start, end });
        }
        let start = start.max(0.0);
        self.start = start;
        self.end = end.max(start + MIN_PROJECT_SPAN);
        Ok(())
    }

    pub fn set_px_per_sec(&mut self, px_per_sec: f64) -> Result<()> {
        if !px_per_sec.is_finite() {
            return Err(CoreError::InvalidValue {
                field: "px_per_sec",
                value: px_per_sec,
            });
        }
        self.px_per_sec = px_per_sec.clamp(MIN_PX_PER_SEC, MAX_PX_PER_SEC);
        Ok(())
    }

    pub fn set_snap(&mut self, snap: Snap) -> Result<()> {
        if !snap.grid_size.is_finite() || snap.grid_size <= 0.0 {
            return Err(CoreError::InvalidValue {
                field: "grid_size",
                value: snap.grid_size,
            });
        }
        self.snap = snap;
        Ok(())
    }

    /// Clamp a playhead position into the window.
    pub fn clamp_position(&self, t: f64) -> f64 {
        if t.is_nan() {
            return self.start;
        }
        t.clamp(self.start, self.end)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the editor knows about the edit: window, tracks, selection.
///
/// All components read this by reference; mutations go through
/// [`ProjectState::apply`](crate::commands).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectState {
    pub project: Project,
    pub timeline: Timeline,
    pub selection: Option<ClipId>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clip(&self, clip_id: ClipId) -> Option<&Clip> {
        self.timeline.find_clip(clip_id).map(|(_, c)| c)
    }

    pub fn selected_clip(&self) -> Option<&Clip> {
        self.selection.and_then(|id| self.clip(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_has_fixed_tracks() {
        let timeline = Timeline::new();
        assert_eq!(timeline.tracks().len(), VIDEO_TRACK_COUNT + AUDIO_TRACK_COUNT);
        assert_eq!(timeline.video_tracks().count(), 3);
        assert_eq!(timeline.audio_tracks().count(), 2);
        assert_eq!(timeline.tracks()[0].name, "Video 1");
        assert_eq!(timeline.tracks()[3].name, "Audio 1");
    }

    #[test]
    fn test_default_tracks() {
        assert_eq!(Timeline::default_track_for(MediaKind::Video), 2);
        assert_eq!(Timeline::default_track_for(MediaKind::Image), 2);
        assert_eq!(Timeline::default_track_for(MediaKind::Audio), 3);
    }

    #[test]
    fn test_push_clip_rejects_wrong_kind() {
        let mut track = Track::audio("Audio 1");
        let clip = Clip::video(MediaId::new(), "v", 5.0, 5.0);
        assert!(matches!(
            track.push_clip(clip),
            Err(CoreError::IncompatibleTrack { .. })
        ));
    }

    #[test]
    fn test_active_clip_half_open() {
        let mut track = Track::video("Video 1");
        let mut clip = Clip::video(MediaId::new(), "v", 5.0, 5.0);
        clip.start = 1.0;
        track.push_clip(clip).unwrap();
        assert!(track.active_clip(0.999).is_none());
        assert!(track.active_clip(1.0).is_some());
        assert!(track.active_clip(6.0).is_none());
    }

    #[test]
    fn test_project_range_clamps() {
        let mut project = Project::new();
        project.set_range(-3.0, 0.5).unwrap();
        assert_eq!(project.start(), 0.0);
        assert_eq!(project.end(), MIN_PROJECT_SPAN);

        project.set_range(10.0, 4.0).unwrap();
        assert_eq!(project.start(), 10.0);
        assert_eq!(project.end(), 10.0 + MIN_PROJECT_SPAN);

        assert!(project.set_range(f64::NAN, 4.0).is_err());
        assert_eq!(project.start(), 10.0);
    }

    #[test]
    fn test_snap_rounds_to_grid() {
        let snap = Snap {
            enabled: true,
            grid_size: 0.5,
        };
        assert_eq!(snap.apply(1.26), 1.5);
        assert_eq!(snap.apply(1.24), 1.0);
        let off = Snap::default();
        assert_eq!(off.apply(1.26), 1.26);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut project = Project::new();
        project.set_px_per_sec(1.0).unwrap();
        assert_eq!(project.px_per_sec(), MIN_PX_PER_SEC);
        project.set_px_per_sec(10_000.0).unwrap();
        assert_eq!(project.px_per_sec(), MAX_PX_PER_SEC);
    }
}
