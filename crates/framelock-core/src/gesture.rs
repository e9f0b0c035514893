//! Pointer-drag gestures over the timeline and the preview canvas.
//!
//! A gesture owns the platform's pointer capture for as long as it lives and
//! releases it exactly once, whether it is committed, cancelled or dropped.
//! While dragging it only produces proposals; the model changes on `commit`.

use crate::clip::{Clip, ClipId, MIN_TRANSFORM_SCALE, Transform};
use crate::commands::{Applied, Intent};
use crate::error::{CoreError, Result};
use crate::geometry::Rect;
use crate::time::pixels_to_seconds;
use crate::timeline::ProjectState;

/// Global pointer-move/pointer-up listeners registered for one gesture.
pub trait PointerCapture {
    fn release(&mut self);
}

/// Releases the capture on drop unless already released.
struct CaptureGuard<C: PointerCapture> {
    capture: Option<C>,
}

impl<C: PointerCapture> CaptureGuard<C> {
    fn new(capture: C) -> Self {
        Self {
            capture: Some(capture),
        }
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
    }
}

impl<C: PointerCapture> Drop for CaptureGuard<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAction {
    Move,
    TrimLeft,
    TrimRight,
    /// Dragging the project end marker.
    ProjectEnd,
}

/// What the model would look like if the drag ended here.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub intent: Intent,
    /// The dragged clip as it would be committed, if the edit is valid.
    pub clip: Option<Clip>,
    /// Project window `(start, end)` as it would be committed.
    pub window: (f64, f64),
    pub valid: bool,
}

/// A timeline drag: move, trim or end-marker.
pub struct DragGesture<C: PointerCapture> {
    guard: CaptureGuard<C>,
    action: DragAction,
    clip: Option<ClipId>,
    origin_x: f64,
    original_start: f64,
    original_project_end: f64,
    track: usize,
}

impl<C: PointerCapture> DragGesture<C> {
    /// Start dragging a clip. Returns `None` (and releases the capture) if the
    /// clip does not exist or the action is not a clip action.
    pub fn begin_clip(
        state: &ProjectState,
        clip: ClipId,
        action: DragAction,
        origin_x: f64,
        capture: C,
    ) -> Option<Self> {
        let mut guard = CaptureGuard::new(capture);
        let found = state.timeline.find_clip(clip);
        let (track, c) = match (found, action) {
            (Some(found), DragAction::Move | DragAction::TrimLeft | DragAction::TrimRight) => found,
            _ => {
                guard.release();
                return None;
            }
        };
        Some(Self {
            guard,
            action,
            clip: Some(clip),
            origin_x,
            original_start: c.start,
            original_project_end: state.project.end(),
            track,
        })
    }

    /// Start dragging the project end marker.
    pub fn begin_project_end(state: &ProjectState, origin_x: f64, capture: C) -> Self {
        Self {
            guard: CaptureGuard::new(capture),
            action: DragAction::ProjectEnd,
            clip: None,
            origin_x,
            original_start: state.project.start(),
            original_project_end: state.project.end(),
            track: 0,
        }
    }

    pub fn action(&self) -> DragAction {
        self.action
    }

    pub fn track(&self) -> usize {
        self.track
    }

    /// Pointer is over `track`. A move follows it only onto compatible tracks.
    pub fn hover_track(&mut self, state: &ProjectState, track: usize) -> bool {
        if self.action != DragAction::Move {
            return false;
        }
        let Some(clip) = self.clip.and_then(|id| state.clip(id)) else {
            return false;
        };
        let compatible = state
            .timeline
            .track(track)
            .map(|t| t.kind.accepts(clip.media_kind()))
            .unwrap_or(false);
        if compatible {
            self.track = track;
        }
        compatible
    }

    /// The intent this drag would commit with the pointer at `pointer_x`.
    pub fn intent_at(&self, state: &ProjectState, pointer_x: f64) -> Intent {
        let delta = pixels_to_seconds(pointer_x - self.origin_x, state.project.px_per_sec());
        let clip = self.clip.unwrap_or_default();
        match self.action {
            DragAction::Move => Intent::MoveClip {
                clip,
                track: self.track,
                start: (self.original_start + delta).max(0.0),
            },
            DragAction::TrimLeft => Intent::TrimLeft { clip, delta },
            DragAction::TrimRight => Intent::TrimRight { clip, delta },
            DragAction::ProjectEnd => Intent::SetProjectRange {
                start: state.project.start(),
                end: self.original_project_end + delta,
            },
        }
    }

    /// Preview the edit without touching `state`.
    ///
    /// Trims are measured from the clip's state at gesture start, so the
    /// preview is computed against the committed model each time.
    pub fn propose(&self, state: &ProjectState, pointer_x: f64) -> Proposal {
        let intent = self.intent_at(state, pointer_x);
        match state.preview(intent.clone()) {
            Ok(next) => Proposal {
                clip: self.clip.and_then(|id| next.clip(id).cloned()),
                window: (next.project.start(), next.project.end()),
                intent,
                valid: true,
            },
            Err(_) => Proposal {
                clip: None,
                window: (state.project.start(), state.project.end()),
                intent,
                valid: false,
            },
        }
    }

    /// Finish the drag, committing the edit if it is valid.
    pub fn commit(mut self, state: &mut ProjectState, pointer_x: f64) -> Result<Applied> {
        let intent = self.intent_at(state, pointer_x);
        self.guard.release();
        state.apply(intent)
    }

    /// Abort the drag. The model is untouched.
    pub fn cancel(mut self) {
        self.guard.release();
    }
}

/// On-screen placement of the selected clip, recorded by the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionOverlay {
    pub clip: ClipId,
    pub rect: Rect,
    /// Scale handle at the bottom-right corner.
    pub handle: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Translate,
    Scale,
}

/// Pan or scale of the selected clip directly on the preview canvas.
/// Coordinates are canvas pixels.
pub struct TransformGesture<C: PointerCapture> {
    guard: CaptureGuard<C>,
    clip: ClipId,
    mode: TransformMode,
    origin: (f64, f64),
    original: Transform,
    rect_width: f64,
}

impl<C: PointerCapture> TransformGesture<C> {
    /// Start a transform if `(x, y)` hits the selection overlay; otherwise
    /// release the capture and ignore the press.
    pub fn begin(
        state: &ProjectState,
        overlay: Option<&SelectionOverlay>,
        x: f64,
        y: f64,
        capture: C,
    ) -> Option<Self> {
        let mut guard = CaptureGuard::new(capture);
        let hit = overlay.and_then(|o| {
            let mode = if o.handle.contains(x, y) {
                TransformMode::Scale
            } else if o.rect.contains(x, y) {
                TransformMode::Translate
            } else {
                return None;
            };
            let visual = state.clip(o.clip)?.kind.visual()?;
            Some((o, mode, visual.transform))
        });
        let Some((overlay, mode, original)) = hit else {
            guard.release();
            return None;
        };
        Some(Self {
            guard,
            clip: overlay.clip,
            mode,
            origin: (x, y),
            original,
            rect_width: overlay.rect.width.max(1.0),
        })
    }

    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    pub fn transform_at(&self, x: f64, y: f64) -> Transform {
        let (dx, dy) = (x - self.origin.0, y - self.origin.1);
        match self.mode {
            TransformMode::Translate => Transform {
                x: self.original.x + dx,
                y: self.original.y + dy,
                scale: self.original.scale,
            },
            TransformMode::Scale => Transform {
                scale: (self.original.scale * (self.rect_width + dx) / self.rect_width)
                    .max(MIN_TRANSFORM_SCALE),
                ..self.original
            },
        }
    }

    pub fn intent_at(&self, x: f64, y: f64) -> Intent {
        Intent::SetTransform {
            clip: self.clip,
            transform: self.transform_at(x, y),
        }
    }

    pub fn commit(mut self, state: &mut ProjectState, x: f64, y: f64) -> Result<Applied> {
        let intent = self.intent_at(x, y);
        self.guard.release();
        if state.clip(self.clip).is_none() {
            return Err(CoreError::ClipNotFound(self.clip));
        }
        state.apply(intent)
    }

    pub fn cancel(mut self) {
        self.guard.release();
    }
}
