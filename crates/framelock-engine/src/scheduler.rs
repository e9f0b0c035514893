//! Audio clip scheduling against the audio graph's device clock.
//!
//! Scheduling is split in two: [`plan_voices`] decides, from the model
//! alone, which part of each audio clip plays and with what envelope;
//! [`AudioScheduler::restart`] turns those plans into graph nodes.

use std::sync::Arc;

use tracing::{debug, warn};

use framelock_core::clip::{AudioEffect, ClipId, ClipKind};
use framelock_core::media::MediaId;
use framelock_core::time::{TimeRange, source_time};
use framelock_core::timeline::ProjectState;

use crate::config::AudioConfig;
use crate::error::GraphError;
use crate::graph::{AudioGraph, BiquadKind, Destination, NodeId};
use crate::media::{AudioBuffer, MediaPool, VideoElement};

/// Shortest span worth scheduling.
const MIN_VOICE_SECS: f64 = 1e-6;

/// A gain automation point, relative to the voice's start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePoint {
    pub at: f64,
    pub value: f64,
    /// Ramp linearly from the previous point instead of jumping.
    pub ramp: bool,
}

/// What to play for one clip, independent of any graph.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePlan {
    pub clip: ClipId,
    pub media: MediaId,
    pub track: usize,
    /// Timeline seconds from the playhead until the voice starts.
    pub delay: f64,
    pub source_offset: f64,
    pub source_duration: f64,
    pub timeline_duration: f64,
    pub rate: f64,
    pub effect: AudioEffect,
    pub envelope: Vec<EnvelopePoint>,
}

/// Plan every audio clip that plays inside the project window from
/// `position` onward. A playhead before the window start waits for it.
pub fn plan_voices(state: &ProjectState, position: f64) -> Vec<VoicePlan> {
    let from = position.max(state.project.start());
    let Ok(window) = TimeRange::new(from, state.project.end()) else {
        return Vec::new();
    };

    let mut plans = Vec::new();
    for (track, t) in state.timeline.audio_tracks() {
        for clip in &t.clips {
            let ClipKind::Audio(props) = &clip.kind else {
                continue;
            };
            let Some(span) = clip.timeline_range().intersection(&window) else {
                continue;
            };
            let duration = span.duration();
            if duration <= MIN_VOICE_SECS {
                continue;
            }
            plans.push(VoicePlan {
                clip: clip.id,
                media: clip.media,
                track,
                delay: span.start - position,
                source_offset: source_time(clip, span.start),
                source_duration: duration * clip.playback_rate,
                timeline_duration: duration,
                rate: clip.playback_rate,
                effect: props.effect,
                envelope: envelope(
                    props.volume,
                    props.fade_in,
                    props.fade_out,
                    span.start - clip.start,
                    clip.end() - span.end,
                    duration,
                ),
            });
        }
    }
    plans
}

/// Gain points for a voice that starts `local_start` seconds into its clip
/// and stops `cut_end` seconds before the clip's end.
///
/// Fades are evaluated in clip-local time, so resuming in the middle of a
/// fade picks up at the matching level. The gain is the lesser of the two
/// ramps, so overlapping fades meet at a continuous peak.
fn envelope(
    volume: f64,
    fade_in: f64,
    fade_out: f64,
    local_start: f64,
    cut_end: f64,
    duration: f64,
) -> Vec<EnvelopePoint> {
    // A voice cut short by the project end fades out before that cut.
    let fade_out = if cut_end > MIN_VOICE_SECS {
        fade_out.min(duration)
    } else {
        fade_out
    };
    let fading_in = fade_in > 0.0 && local_start < fade_in;
    let fading_out = fade_out > 0.0;

    let gain_at = |at: f64| {
        let rise = if fading_in {
            ((local_start + at) / fade_in).min(1.0)
        } else {
            1.0
        };
        let fall = if fading_out {
            ((duration - at) / fade_out).clamp(0.0, 1.0)
        } else {
            1.0
        };
        volume * rise.min(fall)
    };

    let mut breaks = vec![0.0];
    if fading_in || fading_out {
        breaks.push(duration);
    }
    if fading_in {
        breaks.push(fade_in - local_start);
    }
    if fading_out {
        breaks.push(duration - fade_out);
    }
    if fading_in && fading_out {
        // Where the rising and falling ramps cross.
        breaks.push((duration * fade_in - local_start * fade_out) / (fade_in + fade_out));
    }
    breaks.retain(|at| *at >= 0.0 && *at <= duration);
    breaks.sort_by(f64::total_cmp);
    breaks.dedup_by(|a, b| (*a - *b).abs() <= MIN_VOICE_SECS);

    breaks
        .into_iter()
        .enumerate()
        .map(|(i, at)| EnvelopePoint {
            at,
            value: gain_at(at),
            ramp: i > 0,
        })
        .collect()
}

/// A clip that currently owns nodes in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledVoice {
    pub clip: ClipId,
    pub source: NodeId,
    /// The fade/volume gain, last node before the destination.
    pub gain: NodeId,
    pub nodes: Vec<NodeId>,
    /// Device time the voice starts.
    pub start: f64,
    /// Device time the voice ends.
    pub end: f64,
}

/// Keeps at most one voice per clip alive in the audio graph.
#[derive(Debug)]
pub struct AudioScheduler {
    effects: AudioConfig,
    voices: Vec<ScheduledVoice>,
}

impl AudioScheduler {
    pub fn new(effects: AudioConfig) -> Self {
        Self {
            effects,
            voices: Vec::new(),
        }
    }

    pub fn voices(&self) -> &[ScheduledVoice] {
        &self.voices
    }

    pub fn voice_for(&self, clip: ClipId) -> Option<&ScheduledVoice> {
        self.voices.iter().find(|v| v.clip == clip)
    }

    pub fn is_idle(&self) -> bool {
        self.voices.is_empty()
    }

    /// Stop and tear down every scheduled voice. Failures are logged only.
    pub fn stop_all<G: AudioGraph>(&mut self, graph: &mut G) {
        for voice in self.voices.drain(..) {
            if let Err(e) = graph.stop(voice.source) {
                debug!(clip = %voice.clip, "stopping voice: {}", e);
            }
            for node in voice.nodes {
                graph.disconnect(node);
            }
        }
    }

    /// Cancel everything, then schedule each audio clip that plays from
    /// `position` onward. Returns the number of voices scheduled.
    pub fn restart<G: AudioGraph, V: VideoElement>(
        &mut self,
        graph: &mut G,
        state: &ProjectState,
        media: &MediaPool<V>,
        position: f64,
        destination: Destination,
    ) -> usize {
        self.stop_all(graph);
        let now = graph.current_time();
        for plan in plan_voices(state, position) {
            let Some(buffer) = media.audio_buffer(plan.media) else {
                warn!(clip = %plan.clip, media = %plan.media, "no decoded audio for clip");
                continue;
            };
            let mut nodes = Vec::new();
            match self.issue(graph, &plan, buffer.clone(), now, destination, &mut nodes) {
                Ok(voice) => self.voices.push(voice),
                Err(e) => {
                    warn!(clip = %plan.clip, "failed to schedule audio: {}", e);
                    for node in nodes {
                        graph.disconnect(node);
                    }
                }
            }
        }
        debug!(voices = self.voices.len(), position, "audio scheduled");
        self.voices.len()
    }

    fn issue<G: AudioGraph>(
        &self,
        graph: &mut G,
        plan: &VoicePlan,
        buffer: Arc<AudioBuffer>,
        now: f64,
        destination: Destination,
        nodes: &mut Vec<NodeId>,
    ) -> Result<ScheduledVoice, GraphError> {
        let source = graph.create_buffer_source(buffer, plan.rate);
        nodes.push(source);
        let gain = graph.create_gain(0.0);
        nodes.push(gain);

        match plan.effect {
            AudioEffect::None => graph.connect(source, gain)?,
            AudioEffect::Lowpass | AudioEffect::Highpass => {
                let (kind, frequency) = if plan.effect == AudioEffect::Lowpass {
                    (BiquadKind::Lowpass, self.effects.lowpass_hz)
                } else {
                    (BiquadKind::Highpass, self.effects.highpass_hz)
                };
                let filter = graph.create_biquad(kind, frequency, self.effects.filter_q);
                nodes.push(filter);
                graph.connect(source, filter)?;
                graph.connect(filter, gain)?;
            }
            AudioEffect::Echo => {
                let delay = graph.create_delay(self.effects.echo_delay);
                nodes.push(delay);
                let feedback = graph.create_gain(self.effects.echo_feedback);
                nodes.push(feedback);
                graph.connect(source, gain)?;
                graph.connect(source, delay)?;
                graph.connect(delay, feedback)?;
                graph.connect(feedback, delay)?;
                graph.connect(delay, gain)?;
            }
        }
        graph.connect_to(gain, destination)?;

        let start = now + plan.delay;
        for point in &plan.envelope {
            if point.ramp {
                graph.ramp_gain_to(gain, point.value, start + point.at)?;
            } else {
                graph.set_gain_at(gain, point.value, start + point.at)?;
            }
        }
        graph.start(source, start, plan.source_offset, plan.source_duration)?;

        Ok(ScheduledVoice {
            clip: plan.clip,
            source,
            gain,
            nodes: nodes.clone(),
            start,
            end: start + plan.timeline_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_at(points: &[EnvelopePoint], t: f64) -> f64 {
        let mut timeline = crate::automation::ParamTimeline::new(0.0);
        for p in points {
            if p.ramp {
                timeline.linear_ramp_to(p.value, p.at);
            } else {
                timeline.set_value_at(p.value, p.at);
            }
        }
        timeline.value_at(t)
    }

    #[test]
    fn test_envelope_without_fades_holds_volume() {
        let points = envelope(0.7, 0.0, 0.0, 0.0, 0.0, 4.0);
        assert_eq!(points.len(), 1);
        assert_eq!(value_at(&points, 2.0), 0.7);
    }

    #[test]
    fn test_envelope_fade_in_and_out() {
        let points = envelope(1.0, 1.0, 1.0, 0.0, 0.0, 4.0);
        assert!((value_at(&points, 0.5) - 0.5).abs() < 1e-12);
        assert_eq!(value_at(&points, 2.0), 1.0);
        assert!((value_at(&points, 3.5) - 0.5).abs() < 1e-12);
        assert_eq!(value_at(&points, 4.0), 0.0);
    }

    #[test]
    fn test_envelope_resumes_mid_fade_in() {
        // Resume 0.5s into a 2s fade-in.
        let points = envelope(1.0, 2.0, 0.0, 0.5, 0.0, 3.0);
        assert!((value_at(&points, 0.0) - 0.25).abs() < 1e-12);
        assert!((value_at(&points, 0.5) - 0.5).abs() < 1e-12);
        assert_eq!(value_at(&points, 1.5), 1.0);
    }

    #[test]
    fn test_envelope_resumes_mid_fade_out() {
        // One second left of a two second fade-out.
        let points = envelope(1.0, 0.0, 2.0, 3.0, 0.0, 1.0);
        assert!((value_at(&points, 0.0) - 0.5).abs() < 1e-12);
        assert!((value_at(&points, 0.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_overlapping_fades_meet_below_full_volume() {
        let points = envelope(1.0, 3.0, 3.0, 0.0, 0.0, 4.0);
        assert!((value_at(&points, 1.0) - 1.0 / 3.0).abs() < 1e-12);
        // The ramps cross at t=2 and never reach full volume.
        assert!((value_at(&points, 2.0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((value_at(&points, 3.0) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(value_at(&points, 4.0), 0.0);
        let peak = (0..=400)
            .map(|i| value_at(&points, f64::from(i) / 100.0))
            .fold(0.0f64, f64::max);
        assert!((peak - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlapping_fades_resumed_mid_clip() {
        // 1s into a 3s clip with 2s fades: 0.5 now, peak 0.75 at 1.5s.
        let points = envelope(1.0, 2.0, 2.0, 1.0, 0.0, 2.0);
        assert!((value_at(&points, 0.0) - 0.5).abs() < 1e-12);
        assert!((value_at(&points, 0.5) - 0.75).abs() < 1e-12);
        assert!((value_at(&points, 1.0) - 0.5).abs() < 1e-12);
        assert_eq!(value_at(&points, 2.0), 0.0);
    }
}
