use std::fmt;

use uuid::Uuid;

use crate::timeline::TrackKind;

/// Timeline duration used for video whose container reports no usable length.
pub const FALLBACK_VIDEO_DURATION: f64 = 10.0;

/// Timeline duration given to a freshly imported still image.
pub const DEFAULT_IMAGE_DURATION: f64 = 5.0;

/// Identifies a decoded media resource owned by the engine's media pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    /// The kind of track this media may live on.
    pub fn track_kind(self) -> TrackKind {
        match self {
            Self::Video | Self::Image => TrackKind::Video,
            Self::Audio => TrackKind::Audio,
        }
    }
}

/// What the clip model needs to know about a loaded resource.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub kind: MediaKind,
    pub name: String,
    /// Decodable length in seconds. `None` for stills or unknown lengths.
    pub duration: Option<f64>,
    pub natural_width: u32,
    pub natural_height: u32,
}

impl MediaInfo {
    pub fn video(name: impl Into<String>, duration: Option<f64>, width: u32, height: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            name: name.into(),
            duration,
            natural_width: width,
            natural_height: height,
        }
    }

    pub fn image(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            kind: MediaKind::Image,
            name: name.into(),
            duration: None,
            natural_width: width,
            natural_height: height,
        }
    }

    pub fn audio(name: impl Into<String>, duration: f64) -> Self {
        Self {
            kind: MediaKind::Audio,
            name: name.into(),
            duration: Some(duration),
            natural_width: 0,
            natural_height: 0,
        }
    }

    /// Duration in seconds if it is known, finite and positive.
    pub fn usable_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }
}
