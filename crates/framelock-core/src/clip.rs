use std::fmt;

use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::media::{DEFAULT_IMAGE_DURATION, FALLBACK_VIDEO_DURATION, MediaId, MediaInfo, MediaKind};
use crate::time::{self, TimeRange};

/// Clips can never be shorter than this on the timeline.
pub const MIN_CLIP_DURATION: f64 = 0.1;

/// Upper bound accepted for a clip's playback rate.
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

/// Smallest user scale a visual clip can be shrunk to.
pub const MIN_TRANSFORM_SCALE: f64 = 0.05;

/// Tolerance for float noise when checking source bounds.
pub(crate) const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Total decodable length of a clip's source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceExtent {
    Finite(f64),
    /// Stills can be held for any length of time.
    Unbounded,
}

impl SourceExtent {
    pub fn seconds(&self) -> f64 {
        match self {
            Self::Finite(secs) => *secs,
            Self::Unbounded => f64::INFINITY,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Self::Unbounded)
    }
}

/// Colour treatment applied to a visual clip when composited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPreset {
    #[default]
    None,
    BlackWhite,
    /// Warm film look, labelled "35mm" in the UI.
    Sepia,
    Invert,
    Vhs,
}

impl FilterPreset {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BlackWhite => "bw",
            Self::Sepia => "35mm",
            Self::Invert => "invert",
            Self::Vhs => "vhs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "bw" => Some(Self::BlackWhite),
            "35mm" | "sepia" => Some(Self::Sepia),
            "invert" => Some(Self::Invert),
            "vhs" => Some(Self::Vhs),
            _ => None,
        }
    }
}

/// User pan/zoom of a visual clip, in canvas pixels and a scale multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualProps {
    pub opacity: f64,
    pub filter: FilterPreset,
    pub transform: Transform,
}

impl Default for VisualProps {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            filter: FilterPreset::None,
            transform: Transform::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEffect {
    #[default]
    None,
    Lowpass,
    Highpass,
    Echo,
}

impl AudioEffect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lowpass => "lowpass",
            Self::Highpass => "highpass",
            Self::Echo => "echo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "lowpass" => Some(Self::Lowpass),
            "highpass" => Some(Self::Highpass),
            "echo" => Some(Self::Echo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioProps {
    pub volume: f64,
    pub effect: AudioEffect,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Default for AudioProps {
    fn default() -> Self {
        Self {
            volume: 1.0,
            effect: AudioEffect::None,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }
}

/// Per-kind payload of a clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipKind {
    Video(VisualProps),
    Image(VisualProps),
    Audio(AudioProps),
}

impl ClipKind {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Video(_) => MediaKind::Video,
            Self::Image(_) => MediaKind::Image,
            Self::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn visual(&self) -> Option<&VisualProps> {
        match self {
            Self::Video(v) | Self::Image(v) => Some(v),
            Self::Audio(_) => None,
        }
    }

    pub fn visual_mut(&mut self) -> Option<&mut VisualProps> {
        match self {
            Self::Video(v) | Self::Image(v) => Some(v),
            Self::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioProps> {
        match self {
            Self::Audio(a) => Some(a),
            Self::Video(_) | Self::Image(_) => None,
        }
    }

    pub fn audio_mut(&mut self) -> Option<&mut AudioProps> {
        match self {
            Self::Audio(a) => Some(a),
            Self::Video(_) | Self::Image(_) => None,
        }
    }
}

/// A piece of media placed on the timeline.
///
/// `start` and `duration` are timeline seconds; `offset` is the source time
/// at which playback begins. The source window read by the clip is
/// `[offset, offset + duration * playback_rate)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub id: ClipId,
    pub media: MediaId,
    pub name: String,
    pub start: f64,
    pub duration: f64,
    pub offset: f64,
    pub source_duration: SourceExtent,
    pub playback_rate: f64,
    pub kind: ClipKind,
}

impl Clip {
    pub fn new(
        media: MediaId,
        name: impl Into<String>,
        kind: ClipKind,
        source_duration: SourceExtent,
        duration: f64,
    ) -> Self {
        Self {
            id: ClipId::new(),
            media,
            name: name.into(),
            start: 0.0,
            duration,
            offset: 0.0,
            source_duration,
            playback_rate: 1.0,
            kind,
        }
    }

    pub fn video(media: MediaId, name: impl Into<String>, source_secs: f64, duration: f64) -> Self {
        Self::new(
            media,
            name,
            ClipKind::Video(VisualProps::default()),
            SourceExtent::Finite(source_secs),
            duration,
        )
    }

    pub fn image(media: MediaId, name: impl Into<String>, duration: f64) -> Self {
        Self::new(
            media,
            name,
            ClipKind::Image(VisualProps::default()),
            SourceExtent::Unbounded,
            duration,
        )
    }

    pub fn audio(media: MediaId, name: impl Into<String>, source_secs: f64, duration: f64) -> Self {
        Self::new(
            media,
            name,
            ClipKind::Audio(AudioProps::default()),
            SourceExtent::Finite(source_secs),
            duration,
        )
    }

    /// Build an untrimmed clip covering a freshly loaded resource.
    pub fn from_media(media: MediaId, info: &MediaInfo) -> Self {
        match info.kind {
            MediaKind::Video => {
                let secs = info.usable_duration().unwrap_or(FALLBACK_VIDEO_DURATION);
                Self::video(media, &info.name, secs, secs)
            }
            MediaKind::Audio => {
                let secs = info.usable_duration().unwrap_or(MIN_CLIP_DURATION * 2.0);
                Self::audio(media, &info.name, secs, secs)
            }
            MediaKind::Image => Self::image(media, &info.name, DEFAULT_IMAGE_DURATION),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        self.kind.media_kind()
    }

    pub fn is_visual(&self) -> bool {
        self.kind.visual().is_some()
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn timeline_range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end(),
        }
    }

    pub fn is_active_at(&self, t: f64) -> bool {
        self.timeline_range().contains(t)
    }

    /// Source seconds read by the trimmed window.
    pub fn source_consumed(&self) -> f64 {
        time::source_span_for_timeline_duration(self, self.duration)
    }

    pub fn max_duration(&self) -> f64 {
        time::max_timeline_duration(self)
    }

    /// Keep fades inside the clip after its duration changes.
    pub fn clamp_fades(&mut self) {
        let duration = self.duration;
        if let Some(audio) = self.kind.audio_mut() {
            audio.fade_in = audio.fade_in.clamp(0.0, duration);
            audio.fade_out = audio.fade_out.clamp(0.0, duration);
        }
    }

    /// Check every clip invariant. Edits are applied to a copy and only
    /// committed when this passes.
    pub fn validate(&self) -> Result<()> {
        if !self.playback_rate.is_finite()
            || self.playback_rate <= 0.0
            || self.playback_rate > MAX_PLAYBACK_RATE
        {
            return Err(CoreError::InvalidPlaybackRate(self.playback_rate));
        }
        if !self.duration.is_finite() || self.duration <= MIN_CLIP_DURATION {
            return Err(CoreError::DurationTooShort {
                duration: self.duration,
            });
        }
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(CoreError::NegativeStart { start: self.start });
        }
        if !self.offset.is_finite() || self.offset < 0.0 {
            return Err(CoreError::NegativeOffset {
                offset: self.offset,
            });
        }
        let limit = self.source_duration.seconds();
        let end = self.offset + self.source_consumed();
        if end > limit + EPSILON {
            return Err(CoreError::ExceedsSource { end, limit });
        }

        match &self.kind {
            ClipKind::Video(v) | ClipKind::Image(v) => {
                check_unit("opacity", v.opacity)?;
                let t = v.transform;
                if !t.scale.is_finite() || t.scale <= 0.0 {
                    return Err(CoreError::InvalidValue {
                        field: "scale",
                        value: t.scale,
                    });
                }
                if !t.x.is_finite() || !t.y.is_finite() {
                    return Err(CoreError::InvalidValue {
                        field: "translation",
                        value: if t.x.is_finite() { t.y } else { t.x },
                    });
                }
            }
            ClipKind::Audio(a) => {
                check_unit("volume", a.volume)?;
                for (field, fade) in [("fade_in", a.fade_in), ("fade_out", a.fade_out)] {
                    if !fade.is_finite() || fade < 0.0 || fade > self.duration + EPSILON {
                        return Err(CoreError::InvalidValue { field, value: fade });
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidValue { field, value })
    }
}
