use framelock_core::clip::{Clip, ClipId};
use framelock_core::timeline::ProjectState;

/// Assert two floats are within `tolerance`.
pub fn assert_approx(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{actual:.6} != expected {expected:.6} (tolerance {tolerance})"
    );
}

/// Assert a clip satisfies every model invariant.
pub fn assert_clip_valid(clip: &Clip) {
    if let Err(e) = clip.validate() {
        panic!("clip {} ({}) is invalid: {e}", clip.id, clip.name);
    }
}

/// Assert every clip in the project is valid and sits on a compatible track.
pub fn assert_state_valid(state: &ProjectState) {
    for (index, track) in state.timeline.tracks().iter().enumerate() {
        for clip in &track.clips {
            assert_clip_valid(clip);
            assert!(
                track.kind.accepts(clip.media_kind()),
                "clip {} of kind {:?} sits on incompatible track {}",
                clip.id,
                clip.media_kind(),
                index
            );
        }
    }
    if let Some(selected) = state.selection {
        assert!(
            state.clip(selected).is_some(),
            "selection {selected} refers to a missing clip"
        );
    }
    assert!(
        state.project.end() - state.project.start() >= framelock_core::timeline::MIN_PROJECT_SPAN,
        "project window [{}, {}) is too short",
        state.project.start(),
        state.project.end()
    );
}

/// Assert a track has a specific number of clips.
pub fn assert_track_clip_count(state: &ProjectState, track_index: usize, expected: usize) {
    let track = &state.timeline.tracks()[track_index];
    assert_eq!(
        track.clips.len(),
        expected,
        "track {} has {} clips, expected {}",
        track_index,
        track.clips.len(),
        expected
    );
}

/// Assert a clip is on the expected track.
pub fn assert_clip_on_track(state: &ProjectState, clip: ClipId, expected: usize) {
    let found = state.timeline.find_clip(clip).map(|(t, _)| t);
    assert_eq!(
        found,
        Some(expected),
        "clip {clip} is on track {found:?}, expected {expected}"
    );
}
