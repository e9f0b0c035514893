//! Conversions between timeline time and a clip's source-media time.
//!
//! Every consumer (trim editing, audio scheduling, video sync, compositing)
//! goes through these functions so that a clip's playback rate is applied in
//! exactly one place.

use crate::clip::Clip;
use crate::error::{CoreError, Result};

/// A half-open time range `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        // Written negated so NaN bounds are rejected too.
        if !(start < end) {
            return Err(CoreError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlapping part of two ranges, if any.
    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeRange { start, end })
    }
}

/// Source-media time shown by `clip` when the playhead is at `timeline_time`.
pub fn source_time(clip: &Clip, timeline_time: f64) -> f64 {
    clip.offset + (timeline_time - clip.start) * clip.playback_rate
}

/// Timeline time at which `clip` reaches `source_time` in its media.
pub fn timeline_time_for_source(clip: &Clip, source_time: f64) -> f64 {
    clip.start + (source_time - clip.offset) / clip.playback_rate
}

/// Timeline seconds needed to play `source_span` seconds of source.
pub fn timeline_duration_for_source_span(clip: &Clip, source_span: f64) -> f64 {
    source_span / clip.playback_rate
}

/// Source seconds consumed while `timeline_duration` seconds of timeline elapse.
pub fn source_span_for_timeline_duration(clip: &Clip, timeline_duration: f64) -> f64 {
    timeline_duration * clip.playback_rate
}

/// Longest timeline duration the clip can have without reading past its source.
pub fn max_timeline_duration(clip: &Clip) -> f64 {
    timeline_duration_for_source_span(clip, clip.source_duration.seconds() - clip.offset)
}

pub fn pixels_to_seconds(px: f64, px_per_sec: f64) -> f64 {
    px / px_per_sec
}

pub fn seconds_to_pixels(secs: f64, px_per_sec: f64) -> f64 {
    secs * px_per_sec
}

/// `MM:SS` label used by rulers and the transport readout.
pub fn format_timecode(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", (total / 60) % 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;
    use crate::media::MediaId;

    fn clip(start: f64, duration: f64, offset: f64, rate: f64) -> Clip {
        let mut clip = Clip::video(MediaId::new(), "clip", 60.0, duration);
        clip.start = start;
        clip.offset = offset;
        clip.playback_rate = rate;
        clip
    }

    #[test]
    fn test_source_time_at_clip_start_is_offset() {
        let c = clip(4.0, 3.0, 1.25, 1.5);
        assert_eq!(source_time(&c, c.start), c.offset);
    }

    #[test]
    fn test_source_time_scales_with_rate() {
        let c = clip(2.0, 4.0, 1.0, 2.0);
        assert_eq!(source_time(&c, 3.0), 3.0);
    }

    #[test]
    fn test_timeline_time_inverts_source_time() {
        let c = clip(2.0, 4.0, 1.0, 0.5);
        let src = source_time(&c, 4.5);
        assert!((timeline_time_for_source(&c, src) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_max_timeline_duration_accounts_for_rate() {
        let c = clip(0.0, 5.0, 10.0, 2.0);
        // 50s of source left, consumed twice as fast.
        assert_eq!(max_timeline_duration(&c), 25.0);
    }

    #[test]
    fn test_range_rejects_nan_and_inverted() {
        assert!(TimeRange::new(2.0, 1.0).is_err());
        assert!(TimeRange::new(f64::NAN, 1.0).is_err());
        assert!(TimeRange::new(1.0, 1.0).is_err());
    }

    #[test]
    fn test_range_intersection() {
        let a = TimeRange::new(0.0, 5.0).unwrap();
        let b = TimeRange::new(3.0, 8.0).unwrap();
        assert_eq!(a.intersection(&b), Some(TimeRange { start: 3.0, end: 5.0 }));
        let c = TimeRange::new(5.0, 6.0).unwrap();
        assert_eq!(a.intersection(&c), None);
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_format_timecode() {
        assert_eq!(format_timecode(0.0), "00:00");
        assert_eq!(format_timecode(75.9), "01:15");
    }
}
