use framelock_core::clip::{
    AudioEffect, Clip, ClipId, ClipKind, FilterPreset, SourceExtent, Transform,
};
use framelock_core::commands::Intent;
use framelock_core::media::MediaId;
use framelock_core::timeline::{ProjectState, Snap};

/// Builder for test clips with sensible defaults: starts at 0, lasts 5s,
/// reads a 10s source at normal speed.
pub struct ClipBuilder {
    clip: Clip,
}

impl ClipBuilder {
    pub fn video(media: MediaId) -> Self {
        Self {
            clip: Clip::video(media, "video", 10.0, 5.0),
        }
    }

    pub fn image(media: MediaId) -> Self {
        Self {
            clip: Clip::image(media, "image", 5.0),
        }
    }

    pub fn audio(media: MediaId) -> Self {
        Self {
            clip: Clip::audio(media, "audio", 10.0, 5.0),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.clip.name = name.into();
        self
    }

    pub fn start(mut self, secs: f64) -> Self {
        self.clip.start = secs;
        self
    }

    pub fn duration(mut self, secs: f64) -> Self {
        self.clip.duration = secs;
        self
    }

    pub fn offset(mut self, secs: f64) -> Self {
        self.clip.offset = secs;
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.clip.playback_rate = rate;
        self
    }

    pub fn source_secs(mut self, secs: f64) -> Self {
        self.clip.source_duration = SourceExtent::Finite(secs);
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        if let Some(v) = self.clip.kind.visual_mut() {
            v.opacity = opacity;
        }
        self
    }

    pub fn filter(mut self, filter: FilterPreset) -> Self {
        if let Some(v) = self.clip.kind.visual_mut() {
            v.filter = filter;
        }
        self
    }

    pub fn transform(mut self, x: f64, y: f64, scale: f64) -> Self {
        if let Some(v) = self.clip.kind.visual_mut() {
            v.transform = Transform { x, y, scale };
        }
        self
    }

    pub fn volume(mut self, volume: f64) -> Self {
        if let Some(a) = self.clip.kind.audio_mut() {
            a.volume = volume;
        }
        self
    }

    pub fn fades(mut self, fade_in: f64, fade_out: f64) -> Self {
        if let ClipKind::Audio(a) = &mut self.clip.kind {
            a.fade_in = fade_in;
            a.fade_out = fade_out;
        }
        self
    }

    pub fn effect(mut self, effect: AudioEffect) -> Self {
        if let Some(a) = self.clip.kind.audio_mut() {
            a.effect = effect;
        }
        self
    }

    pub fn build(self) -> Clip {
        self.clip
    }
}

/// Builder for a project state with clips placed on explicit tracks.
pub struct ProjectStateBuilder {
    window: Option<(f64, f64)>,
    snap: Option<f64>,
    clips: Vec<(usize, Clip)>,
    select: Option<ClipId>,
}

impl ProjectStateBuilder {
    pub fn new() -> Self {
        Self {
            window: None,
            snap: None,
            clips: Vec::new(),
            select: None,
        }
    }

    pub fn window(mut self, start: f64, end: f64) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn snap(mut self, grid_size: f64) -> Self {
        self.snap = Some(grid_size);
        self
    }

    pub fn clip(mut self, track: usize, clip: Clip) -> Self {
        self.clips.push((track, clip));
        self
    }

    pub fn select(mut self, clip: ClipId) -> Self {
        self.select = Some(clip);
        self
    }

    pub fn build(self) -> ProjectState {
        let mut state = ProjectState::new();
        if let Some((start, end)) = self.window {
            state
                .project
                .set_range(start, end)
                .expect("test window must be valid");
        }
        if let Some(grid_size) = self.snap {
            state
                .project
                .set_snap(Snap {
                    enabled: true,
                    grid_size,
                })
                .expect("test snap grid must be valid");
        }
        for (track, clip) in self.clips {
            state
                .apply(Intent::AddClip { track, clip })
                .expect("test clip must be valid for its track");
        }
        if self.select.is_some() {
            state
                .apply(Intent::Select { clip: self.select })
                .expect("selected clip must exist");
        }
        state
    }
}

impl Default for ProjectStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_builder_defaults() {
        let clip = ClipBuilder::video(MediaId::new()).build();
        assert_eq!(clip.start, 0.0);
        assert_eq!(clip.duration, 5.0);
        assert_eq!(clip.playback_rate, 1.0);
        assert!(clip.validate().is_ok());
    }

    #[test]
    fn test_state_builder_places_clips() {
        let clip = ClipBuilder::audio(MediaId::new()).start(2.0).build();
        let id = clip.id;
        let state = ProjectStateBuilder::new()
            .window(0.0, 10.0)
            .clip(3, clip)
            .select(id)
            .build();
        assert_eq!(state.timeline.find_clip(id).map(|(t, _)| t), Some(3));
        assert_eq!(state.selection, Some(id));
        assert_eq!(state.project.end(), 10.0);
    }
}
