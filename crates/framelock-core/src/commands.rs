use tracing::debug;

use crate::clip::{
    AudioEffect, Clip, ClipId, EPSILON, FilterPreset, MAX_PLAYBACK_RATE, MIN_CLIP_DURATION,
    MIN_TRANSFORM_SCALE, Transform,
};
use crate::error::{CoreError, Result};
use crate::timeline::{Project, ProjectState, Snap, Timeline};

/// An edit requested by the UI layer. Every intent goes through
/// [`ProjectState::apply`], which validates the result before committing.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Place a clip on a specific track at its current `start`.
    AddClip { track: usize, clip: Clip },
    /// Place a clip at the end of its kind's default track.
    AppendClip { clip: Clip },
    MoveClip { clip: ClipId, track: usize, start: f64 },
    /// Move the left edge by `delta` timeline seconds, keeping the right edge.
    TrimLeft { clip: ClipId, delta: f64 },
    /// Move the right edge by `delta` timeline seconds.
    TrimRight { clip: ClipId, delta: f64 },
    /// Change playback rate, keeping the same source material on screen.
    ChangeSpeed { clip: ClipId, rate: f64 },
    SetOpacity { clip: ClipId, opacity: f64 },
    SetFilter { clip: ClipId, filter: FilterPreset },
    SetTransform { clip: ClipId, transform: Transform },
    SetVolume { clip: ClipId, volume: f64 },
    SetAudioEffect { clip: ClipId, effect: AudioEffect },
    SetFades { clip: ClipId, fade_in: f64, fade_out: f64 },
    DeleteClip { clip: ClipId },
    SetProjectRange { start: f64, end: f64 },
    SetZoom { px_per_sec: f64 },
    SetSnap { enabled: bool, grid_size: f64 },
    Select { clip: Option<ClipId> },
}

impl Intent {
    pub fn description(&self) -> &'static str {
        match self {
            Self::AddClip { .. } | Self::AppendClip { .. } => "Add clip",
            Self::MoveClip { .. } => "Move clip",
            Self::TrimLeft { .. } => "Trim clip start",
            Self::TrimRight { .. } => "Trim clip end",
            Self::ChangeSpeed { .. } => "Change speed",
            Self::SetOpacity { .. } => "Set opacity",
            Self::SetFilter { .. } => "Set filter",
            Self::SetTransform { .. } => "Set transform",
            Self::SetVolume { .. } => "Set volume",
            Self::SetAudioEffect { .. } => "Set audio effect",
            Self::SetFades { .. } => "Set fades",
            Self::DeleteClip { .. } => "Delete clip",
            Self::SetProjectRange { .. } => "Set project range",
            Self::SetZoom { .. } => "Zoom",
            Self::SetSnap { .. } => "Snap settings",
            Self::Select { .. } => "Select",
        }
    }
}

/// What a committed intent changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    ClipAdded(ClipId),
    ClipUpdated(ClipId),
    /// The removed clip, so the caller can release its media.
    ClipDeleted(Clip),
    ProjectUpdated,
    SelectionChanged(Option<ClipId>),
}

impl ProjectState {
    /// Apply an intent atomically: either every invariant holds afterwards
    /// and the change is committed, or an error is returned and the state is
    /// exactly as before.
    pub fn apply(&mut self, intent: Intent) -> Result<Applied> {
        let description = intent.description();
        let result = self.apply_inner(intent);
        if let Err(e) = &result {
            debug!(intent = description, error = %e, "rejected edit");
        }
        result
    }

    /// Run an intent against a copy of the state, for drag previews.
    pub fn preview(&self, intent: Intent) -> Result<ProjectState> {
        let mut copy = self.clone();
        copy.apply_inner(intent)?;
        Ok(copy)
    }

    fn apply_inner(&mut self, intent: Intent) -> Result<Applied> {
        match intent {
            Intent::AddClip { track, clip } => self.add_clip(track, clip),
            Intent::AppendClip { mut clip } => {
                let track = Timeline::default_track_for(clip.media_kind());
                clip.start = self.timeline.track(track)?.end_position();
                self.add_clip(track, clip)
            }
            Intent::MoveClip { clip, track, start } => self.move_clip(clip, track, start),
            Intent::TrimLeft { clip, delta } => {
                self.edit_clip(clip, |c, project| trim_left(c, delta, project.snap()))
            }
            Intent::TrimRight { clip, delta } => {
                self.edit_clip(clip, |c, project| trim_right(c, delta, project.snap()))
            }
            Intent::ChangeSpeed { clip, rate } => self.edit_clip(clip, |c, _| change_speed(c, rate)),
            Intent::SetOpacity { clip, opacity } => self.edit_clip(clip, |c, _| {
                let id = c.id;
                let visual = c.kind.visual_mut().ok_or(CoreError::WrongClipKind {
                    clip: id,
                    expected: "visual",
                })?;
                visual.opacity = finite("opacity", opacity)?.clamp(0.0, 1.0);
                Ok(())
            }),
            Intent::SetFilter { clip, filter } => self.edit_clip(clip, |c, _| {
                let id = c.id;
                let visual = c.kind.visual_mut().ok_or(CoreError::WrongClipKind {
                    clip: id,
                    expected: "visual",
                })?;
                visual.filter = filter;
                Ok(())
            }),
            Intent::SetTransform { clip, transform } => self.edit_clip(clip, |c, _| {
                let id = c.id;
                let visual = c.kind.visual_mut().ok_or(CoreError::WrongClipKind {
                    clip: id,
                    expected: "visual",
                })?;
                visual.transform = Transform {
                    x: finite("translate_x", transform.x)?,
                    y: finite("translate_y", transform.y)?,
                    scale: finite("scale", transform.scale)?.max(MIN_TRANSFORM_SCALE),
                };
                Ok(())
            }),
            Intent::SetVolume { clip, volume } => self.edit_clip(clip, |c, _| {
                let id = c.id;
                let audio = c.kind.audio_mut().ok_or(CoreError::WrongClipKind {
                    clip: id,
                    expected: "audio",
                })?;
                audio.volume = finite("volume", volume)?.clamp(0.0, 1.0);
                Ok(())
            }),
            Intent::SetAudioEffect { clip, effect } => self.edit_clip(clip, |c, _| {
                let id = c.id;
                let audio = c.kind.audio_mut().ok_or(CoreError::WrongClipKind {
                    clip: id,
                    expected: "audio",
                })?;
                audio.effect = effect;
                Ok(())
            }),
            Intent::SetFades {
                clip,
                fade_in,
                fade_out,
            } => self.edit_clip(clip, |c, _| {
                let id = c.id;
                let audio = c.kind.audio_mut().ok_or(CoreError::WrongClipKind {
                    clip: id,
                    expected: "audio",
                })?;
                audio.fade_in = finite("fade_in", fade_in)?;
                audio.fade_out = finite("fade_out", fade_out)?;
                c.clamp_fades();
                Ok(())
            }),
            Intent::DeleteClip { clip } => {
                let (track, _) = self
                    .timeline
                    .find_clip(clip)
                    .ok_or(CoreError::ClipNotFound(clip))?;
                let removed = self.timeline.track_mut(track)?.remove_clip(clip)?;
                if self.selection == Some(clip) {
                    self.selection = None;
                }
                Ok(Applied::ClipDeleted(removed))
            }
            Intent::SetProjectRange { start, end } => {
                self.project.set_range(start, end)?;
                Ok(Applied::ProjectUpdated)
            }
            Intent::SetZoom { px_per_sec } => {
                self.project.set_px_per_sec(px_per_sec)?;
                Ok(Applied::ProjectUpdated)
            }
            Intent::SetSnap { enabled, grid_size } => {
                self.project.set_snap(Snap { enabled, grid_size })?;
                Ok(Applied::ProjectUpdated)
            }
            Intent::Select { clip } => {
                if let Some(id) = clip {
                    self.clip(id).ok_or(CoreError::ClipNotFound(id))?;
                }
                self.selection = clip;
                Ok(Applied::SelectionChanged(clip))
            }
        }
    }

    fn add_clip(&mut self, track: usize, mut clip: Clip) -> Result<Applied> {
        clip.clamp_fades();
        clip.validate()?;
        let id = clip.id;
        self.timeline.track_mut(track)?.push_clip(clip)?;
        Ok(Applied::ClipAdded(id))
    }

    fn move_clip(&mut self, clip_id: ClipId, dest: usize, start: f64) -> Result<Applied> {
        let start = finite("start", start)?;
        let (source, clip) = self
            .timeline
            .find_clip(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        self.timeline.track(dest)?.check_accepts(clip.media_kind())?;

        let mut moved = clip.clone();
        moved.start = self.project.snap().apply(start).max(0.0);
        moved.validate()?;

        if source == dest {
            if let Some(c) = self.timeline.track_mut(source)?.get_clip_mut(clip_id) {
                *c = moved;
            }
        } else {
            self.timeline.track_mut(source)?.remove_clip(clip_id)?;
            self.timeline.track_mut(dest)?.push_clip(moved)?;
        }
        Ok(Applied::ClipUpdated(clip_id))
    }

    /// Edit a copy of the clip and write it back only if it validates.
    fn edit_clip<F>(&mut self, clip_id: ClipId, f: F) -> Result<Applied>
    where
        F: FnOnce(&mut Clip, &Project) -> Result<()>,
    {
        let project = &self.project;
        let (_, clip) = self
            .timeline
            .find_clip_mut(clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        let mut edited = clip.clone();
        f(&mut edited, project)?;
        edited.validate()?;
        *clip = edited;
        Ok(Applied::ClipUpdated(clip_id))
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoreError::InvalidValue { field, value })
    }
}

/// Drag the left edge. The right edge stays put; the source offset moves by
/// the same amount of source material the timeline edge moved over.
fn trim_left(clip: &mut Clip, delta: f64, snap: Snap) -> Result<()> {
    let delta = finite("delta", delta)?;
    let mut new_start = snap.apply(clip.start + delta);
    // Cannot pull the edge before timeline zero or before the source start.
    let earliest = (clip.start - clip.offset / clip.playback_rate).max(0.0);
    new_start = new_start.max(earliest);

    let delta = new_start - clip.start;
    let new_duration = clip.duration - delta;
    if new_duration <= MIN_CLIP_DURATION {
        return Err(CoreError::DurationTooShort {
            duration: new_duration,
        });
    }

    let mut new_offset = clip.offset + delta * clip.playback_rate;
    if new_offset < 0.0 && new_offset > -EPSILON {
        new_offset = 0.0;
    }
    clip.start = new_start;
    clip.duration = new_duration;
    clip.offset = new_offset;
    clip.clamp_fades();
    Ok(())
}

/// Drag the right edge, clamped to the end of the source.
fn trim_right(clip: &mut Clip, delta: f64, snap: Snap) -> Result<()> {
    let delta = finite("delta", delta)?;
    let new_end = snap.apply(clip.end() + delta);
    let new_duration = (new_end - clip.start).min(clip.max_duration());
    if new_duration <= MIN_CLIP_DURATION {
        return Err(CoreError::DurationTooShort {
            duration: new_duration,
        });
    }
    clip.duration = new_duration;
    clip.clamp_fades();
    Ok(())
}

fn change_speed(clip: &mut Clip, rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 || rate > MAX_PLAYBACK_RATE {
        return Err(CoreError::InvalidPlaybackRate(rate));
    }
    let consumed = clip.source_consumed();
    clip.playback_rate = rate;
    clip.duration = consumed / rate;
    clip.clamp_fades();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaId;

    fn state_with_video(duration: f64, source: f64) -> (ProjectState, ClipId) {
        let mut state = ProjectState::new();
        let clip = Clip::video(MediaId::new(), "v", source, duration);
        let id = clip.id;
        state.apply(Intent::AddClip { track: 0, clip }).unwrap();
        (state, id)
    }

    #[test]
    fn test_trim_left_moves_offset_by_rate() {
        let (mut state, id) = state_with_video(10.0, 30.0);
        state
            .apply(Intent::ChangeSpeed { clip: id, rate: 2.0 })
            .unwrap();
        state
            .apply(Intent::TrimLeft { clip: id, delta: 1.0 })
            .unwrap();
        let clip = state.clip(id).unwrap();
        assert_eq!(clip.start, 1.0);
        assert_eq!(clip.duration, 4.0);
        assert_eq!(clip.offset, 2.0);
    }

    #[test]
    fn test_trim_left_stops_at_source_start() {
        let (mut state, id) = state_with_video(5.0, 10.0);
        state
            .apply(Intent::MoveClip {
                clip: id,
                track: 0,
                start: 4.0,
            })
            .unwrap();
        state
            .apply(Intent::TrimLeft { clip: id, delta: -3.0 })
            .unwrap();
        let clip = state.clip(id).unwrap();
        assert_eq!(clip.start, 4.0);
        assert_eq!(clip.offset, 0.0);
        assert_eq!(clip.duration, 5.0);
    }

    #[test]
    fn test_too_short_trim_is_rejected_without_change() {
        let (mut state, id) = state_with_video(5.0, 10.0);
        let before = state.clone();
        let result = state.apply(Intent::TrimRight { clip: id, delta: -4.95 });
        assert!(matches!(result, Err(CoreError::DurationTooShort { .. })));
        assert_eq!(state, before);
    }

    #[test]
    fn test_set_volume_on_video_is_wrong_kind() {
        let (mut state, id) = state_with_video(5.0, 10.0);
        let result = state.apply(Intent::SetVolume {
            clip: id,
            volume: 0.5,
        });
        assert!(matches!(result, Err(CoreError::WrongClipKind { .. })));
    }

    #[test]
    fn test_preview_does_not_commit() {
        let (state, id) = state_with_video(5.0, 10.0);
        let preview = state
            .preview(Intent::TrimRight { clip: id, delta: 2.0 })
            .unwrap();
        assert_eq!(preview.clip(id).unwrap().duration, 7.0);
        assert_eq!(state.clip(id).unwrap().duration, 5.0);
    }
}
