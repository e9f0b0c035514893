use framelock_core::clip::FilterPreset;
use framelock_core::media::MediaId;
use framelock_engine::compositor::Compositor;
use framelock_engine::config::CanvasConfig;
use framelock_engine::media::{LoadedMedia, MediaPool, StillImage};
use framelock_test_harness::builders::{ClipBuilder, ProjectStateBuilder};
use framelock_test_harness::fakes::FakeVideoElement;
use framelock_test_harness::fixtures::solid_frame;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn compositor() -> Compositor {
    Compositor::new(CanvasConfig {
        width: 64,
        height: 36,
    })
}

fn video(pool: &mut MediaPool<FakeVideoElement>, rgba: [u8; 4]) -> MediaId {
    let element = FakeVideoElement::new(16, 9, rgba, Some(10.0));
    pool.insert("video.mp4", LoadedMedia::Video(element)).0
}

#[test]
fn test_higher_track_draws_over_lower() {
    let mut pool = MediaPool::new();
    let red = video(&mut pool, RED);
    let blue = video(&mut pool, BLUE);
    let state = ProjectStateBuilder::new()
        .clip(0, ClipBuilder::video(red).build())
        .clip(2, ClipBuilder::video(blue).build())
        .build();
    let compositor = compositor();

    let plan = compositor.plan_frame(&state, &pool, 1.0);
    let tracks: Vec<usize> = plan.layers.iter().map(|l| l.track).collect();
    assert_eq!(tracks, vec![0, 2]);

    let mut canvas = compositor.new_canvas();
    compositor.render(&plan, &pool, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), BLUE);
    assert_eq!(canvas.pixel(0, 0), BLUE);
}

#[test]
fn test_empty_timeline_renders_background() {
    let pool: MediaPool<FakeVideoElement> = MediaPool::new();
    let state = ProjectStateBuilder::new().build();
    let compositor = compositor();
    let mut canvas = solid_frame(64, 36, GREEN);

    let overlay = compositor.draw_frame(&state, &pool, 0.0, &mut canvas);
    assert!(overlay.is_none());
    assert_eq!(canvas.pixel(10, 10), BLACK);
}

#[test]
fn test_only_active_clips_are_drawn() {
    let mut pool = MediaPool::new();
    let red = video(&mut pool, RED);
    let blue = video(&mut pool, BLUE);
    let state = ProjectStateBuilder::new()
        .clip(0, ClipBuilder::video(red).duration(10.0).build())
        .clip(2, ClipBuilder::video(blue).start(2.0).duration(1.0).build())
        .build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    compositor.draw_frame(&state, &pool, 2.5, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), BLUE);
    compositor.draw_frame(&state, &pool, 3.0, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), RED);
}

#[test]
fn test_opacity_blends_with_layer_below() {
    let mut pool = MediaPool::new();
    let red = video(&mut pool, RED);
    let blue = video(&mut pool, BLUE);
    let state = ProjectStateBuilder::new()
        .clip(0, ClipBuilder::video(red).build())
        .clip(1, ClipBuilder::video(blue).opacity(0.5).build())
        .build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    compositor.draw_frame(&state, &pool, 0.0, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), [128, 0, 128, 255]);
}

#[test]
fn test_scaled_layer_reveals_layer_below() {
    let mut pool = MediaPool::new();
    let red = video(&mut pool, RED);
    let blue = video(&mut pool, BLUE);
    let state = ProjectStateBuilder::new()
        .clip(0, ClipBuilder::video(red).build())
        .clip(2, ClipBuilder::video(blue).transform(0.0, 0.0, 0.5).build())
        .build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    compositor.draw_frame(&state, &pool, 0.0, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), BLUE);
    assert_eq!(canvas.pixel(2, 2), RED);
}

#[test]
fn test_translation_moves_layer() {
    let mut pool = MediaPool::new();
    let blue = video(&mut pool, BLUE);
    let state = ProjectStateBuilder::new()
        .clip(2, ClipBuilder::video(blue).transform(32.0, 0.0, 1.0).build())
        .build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    compositor.draw_frame(&state, &pool, 0.0, &mut canvas);
    assert_eq!(canvas.pixel(10, 18), BLACK);
    assert_eq!(canvas.pixel(40, 18), BLUE);
}

#[test]
fn test_filter_applies_to_layer() {
    let mut pool = MediaPool::new();
    let red = video(&mut pool, RED);
    let state = ProjectStateBuilder::new()
        .clip(
            2,
            ClipBuilder::video(red)
                .filter(FilterPreset::Invert)
                .build(),
        )
        .build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    compositor.draw_frame(&state, &pool, 0.0, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), [0, 255, 255, 255]);
}

#[test]
fn test_image_is_letterboxed() {
    let mut pool: MediaPool<FakeVideoElement> = MediaPool::new();
    let (image, _) = pool.insert(
        "square.png",
        LoadedMedia::Image(StillImage::new(solid_frame(10, 10, GREEN))),
    );
    let state = ProjectStateBuilder::new()
        .clip(2, ClipBuilder::image(image).build())
        .build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    compositor.draw_frame(&state, &pool, 1.0, &mut canvas);
    assert_eq!(canvas.pixel(32, 18), GREEN);
    // A square source in a 16:9 canvas leaves bars at the sides.
    assert_eq!(canvas.pixel(2, 18), BLACK);
    assert_eq!(canvas.pixel(61, 18), BLACK);
}

#[test]
fn test_selection_overlay_tracks_drawn_rect() {
    let mut pool = MediaPool::new();
    let blue = video(&mut pool, BLUE);
    let clip = ClipBuilder::video(blue).transform(0.0, 0.0, 0.5).build();
    let id = clip.id;
    let state = ProjectStateBuilder::new().clip(2, clip).select(id).build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    let overlay = compositor
        .draw_frame(&state, &pool, 0.0, &mut canvas)
        .unwrap();
    assert_eq!(overlay.clip, id);
    assert_eq!(
        (overlay.rect.x, overlay.rect.y, overlay.rect.width, overlay.rect.height),
        (16.0, 9.0, 32.0, 18.0)
    );
    assert!(overlay.handle.contains(overlay.rect.right(), overlay.rect.bottom()));
    // Outline and handle are painted over the layer.
    assert_eq!(canvas.pixel(16, 18), [0, 168, 255, 255]);
    assert_eq!(canvas.pixel(48, 27), [0, 168, 255, 255]);
    assert_eq!(canvas.pixel(32, 18), BLUE);
}

#[test]
fn test_selected_but_inactive_clip_has_no_overlay() {
    let mut pool = MediaPool::new();
    let blue = video(&mut pool, BLUE);
    let clip = ClipBuilder::video(blue).start(5.0).build();
    let id = clip.id;
    let state = ProjectStateBuilder::new().clip(2, clip).select(id).build();
    let compositor = compositor();
    let mut canvas = compositor.new_canvas();

    assert!(compositor.draw_frame(&state, &pool, 1.0, &mut canvas).is_none());
}
