use thiserror::Error;

use crate::clip::ClipId;
use crate::media::MediaKind;
use crate::timeline::TrackKind;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("track not found: {0}")]
    TrackNotFound(usize),

    #[error("{media:?} media cannot be placed on a {track:?} track")]
    IncompatibleTrack { media: MediaKind, track: TrackKind },

    #[error("clip {clip} is not a {expected} clip")]
    WrongClipKind { clip: ClipId, expected: &'static str },

    #[error("clip duration {duration:.3}s is below the minimum")]
    DurationTooShort { duration: f64 },

    #[error("source offset {offset:.3}s is negative")]
    NegativeOffset { offset: f64 },

    #[error("clip start {start:.3}s is negative")]
    NegativeStart { start: f64 },

    #[error("trimmed window ends at {end:.3}s, past the source length {limit:.3}s")]
    ExceedsSource { end: f64, limit: f64 },

    #[error("invalid playback rate: {0}")]
    InvalidPlaybackRate(f64),

    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },

    #[error("invalid time range: start {start} >= end {end}")]
    InvalidTimeRange { start: f64, end: f64 },

    #[error("invalid project range: {start}..{end}")]
    InvalidProjectRange { start: f64, end: f64 },
}

pub type Result<T> = std::result::Result<T, CoreError>;
