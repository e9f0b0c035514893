//! Preview/export frame composition.
//!
//! Visual tracks are drawn bottom-up (track 0 first), one active clip per
//! track. Each layer is fitted to the canvas preserving aspect ratio, then
//! the clip's transform is applied on top of the fit.

use rayon::prelude::*;
use tracing::trace;

use framelock_core::clip::{ClipId, FilterPreset};
use framelock_core::geometry::Rect;
use framelock_core::gesture::SelectionOverlay;
use framelock_core::media::MediaId;
use framelock_core::timeline::ProjectState;

use crate::config::CanvasConfig;
use crate::frame::FrameBuffer;
use crate::media::{MediaPool, VideoElement};

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const OUTLINE: [u8; 4] = [0, 168, 255, 255];
const OUTLINE_WIDTH: f64 = 2.0;
pub const HANDLE_SIZE: f64 = 12.0;

/// One clip's placement on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub track: usize,
    pub clip: ClipId,
    pub media: MediaId,
    pub dest: Rect,
    pub opacity: f64,
    pub filter: FilterPreset,
}

/// Everything needed to rasterize one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlan {
    /// Back to front.
    pub layers: Vec<Layer>,
    pub overlay: Option<SelectionOverlay>,
}

#[derive(Debug, Clone)]
pub struct Compositor {
    width: u32,
    height: u32,
}

impl Compositor {
    pub fn new(canvas: CanvasConfig) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn new_canvas(&self) -> FrameBuffer {
        FrameBuffer::solid(self.width, self.height, BACKGROUND)
    }

    /// Fit `natural` into the canvas, then apply `scale` and offset.
    pub fn layout(&self, natural: (u32, u32), x: f64, y: f64, scale: f64) -> Option<Rect> {
        let (nw, nh) = (f64::from(natural.0), f64::from(natural.1));
        if nw <= 0.0 || nh <= 0.0 {
            return None;
        }
        let (cw, ch) = (f64::from(self.width), f64::from(self.height));
        let s = (cw / nw).min(ch / nh) * scale;
        let (w, h) = (nw * s, nh * s);
        Some(Rect::new((cw - w) / 2.0 + x, (ch - h) / 2.0 + y, w, h))
    }

    /// Decide what to draw at `position` without touching pixels.
    pub fn plan_frame<V: VideoElement>(
        &self,
        state: &ProjectState,
        media: &MediaPool<V>,
        position: f64,
    ) -> FramePlan {
        let mut plan = FramePlan::default();
        for (track, t) in state.timeline.video_tracks() {
            let Some(clip) = t.active_clip(position) else {
                continue;
            };
            let Some(visual) = clip.kind.visual() else {
                continue;
            };
            let Some(source) = media.frame_source(clip.media) else {
                trace!(clip = %clip.id, "no frame source for active clip");
                continue;
            };
            let tf = visual.transform;
            let Some(dest) = self.layout(source.natural_size(), tf.x, tf.y, tf.scale) else {
                continue;
            };
            if state.selection == Some(clip.id) {
                plan.overlay = Some(SelectionOverlay {
                    clip: clip.id,
                    rect: dest,
                    handle: Rect::centered_square(dest.right(), dest.bottom(), HANDLE_SIZE),
                });
            }
            plan.layers.push(Layer {
                track,
                clip: clip.id,
                media: clip.media,
                dest,
                opacity: visual.opacity,
                filter: visual.filter,
            });
        }
        plan
    }

    /// Rasterize `plan` into `canvas`, replacing its contents.
    pub fn render<V: VideoElement>(
        &self,
        plan: &FramePlan,
        media: &MediaPool<V>,
        canvas: &mut FrameBuffer,
    ) {
        if canvas.width != self.width || canvas.height != self.height {
            *canvas = self.new_canvas();
        } else {
            canvas.fill(BACKGROUND);
        }
        for layer in &plan.layers {
            let Some(frame) = media
                .frame_source(layer.media)
                .and_then(|source| source.current_frame())
            else {
                continue;
            };
            if layer.filter == FilterPreset::None {
                blit(canvas, frame, layer.dest, layer.opacity);
            } else {
                blit(canvas, &frame.filtered(layer.filter), layer.dest, layer.opacity);
            }
        }
        if let Some(overlay) = &plan.overlay {
            stroke_rect(canvas, overlay.rect, OUTLINE_WIDTH, OUTLINE);
            fill_rect(canvas, overlay.handle, OUTLINE);
        }
    }

    /// Plan and rasterize in one go, returning the selection overlay.
    pub fn draw_frame<V: VideoElement>(
        &self,
        state: &ProjectState,
        media: &MediaPool<V>,
        position: f64,
        canvas: &mut FrameBuffer,
    ) -> Option<SelectionOverlay> {
        let plan = self.plan_frame(state, media, position);
        self.render(&plan, media, canvas);
        plan.overlay
    }
}

/// Canvas pixel span `[lo, hi)` covered by `[start, end)`.
fn pixel_span(start: f64, end: f64, limit: u32) -> (u32, u32) {
    let lo = start.round().clamp(0.0, f64::from(limit)) as u32;
    let hi = end.round().clamp(0.0, f64::from(limit)) as u32;
    (lo, hi.max(lo))
}

/// Nearest-neighbour scale of `src` into `dest` with source-over blending.
fn blit(canvas: &mut FrameBuffer, src: &FrameBuffer, dest: Rect, opacity: f64) {
    if src.is_empty() || dest.width <= 0.0 || dest.height <= 0.0 || opacity <= 0.0 {
        return;
    }
    let (x0, x1) = pixel_span(dest.x, dest.right(), canvas.width);
    let (y0, y1) = pixel_span(dest.y, dest.bottom(), canvas.height);
    if x0 == x1 || y0 == y1 {
        return;
    }
    let sx = f64::from(src.width) / dest.width;
    let sy = f64::from(src.height) / dest.height;
    let opacity = opacity.clamp(0.0, 1.0) as f32;
    let row_bytes = canvas.width as usize * 4;

    // Row-based parallelism to avoid rayon micro-task overhead
    canvas
        .data
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(cy, row)| {
            let src_y = (((cy as f64 + 0.5 - dest.y) * sy).floor() as i64)
                .clamp(0, i64::from(src.height) - 1) as u32;
            for cx in x0..x1 {
                let src_x = (((f64::from(cx) + 0.5 - dest.x) * sx).floor() as i64)
                    .clamp(0, i64::from(src.width) - 1) as u32;
                let s = src.pixel(src_x, src_y);
                let i = cx as usize * 4;
                blend(&mut row[i..i + 4], s, opacity);
            }
        });
}

fn blend(dst: &mut [u8], src: [u8; 4], opacity: f32) {
    let a = f32::from(src[3]) / 255.0 * opacity;
    if a <= 0.0 {
        return;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = a + da * (1.0 - a);
    for c in 0..3 {
        let s = f32::from(src[c]) / 255.0;
        let d = f32::from(dst[c]) / 255.0;
        let v = if out_a > 0.0 {
            (s * a + d * da * (1.0 - a)) / out_a
        } else {
            0.0
        };
        dst[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

fn fill_rect(canvas: &mut FrameBuffer, rect: Rect, rgba: [u8; 4]) {
    let (x0, x1) = pixel_span(rect.x, rect.right(), canvas.width);
    let (y0, y1) = pixel_span(rect.y, rect.bottom(), canvas.height);
    for y in y0..y1 {
        for x in x0..x1 {
            canvas.pixel_mut(x, y).copy_from_slice(&rgba);
        }
    }
}

fn stroke_rect(canvas: &mut FrameBuffer, rect: Rect, width: f64, rgba: [u8; 4]) {
    let edges = [
        Rect::new(rect.x, rect.y, rect.width, width),
        Rect::new(rect.x, rect.bottom() - width, rect.width, width),
        Rect::new(rect.x, rect.y, width, rect.height),
        Rect::new(rect.right() - width, rect.y, width, rect.height),
    ];
    for edge in edges {
        fill_rect(canvas, edge, rgba);
    }
}
