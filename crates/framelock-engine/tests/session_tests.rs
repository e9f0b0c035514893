use framelock_core::commands::{Applied, Intent};
use framelock_core::timeline::{DEFAULT_AUDIO_TRACK, DEFAULT_VIDEO_TRACK};
use framelock_engine::config::{CanvasConfig, EngineConfig};
use framelock_engine::error::ImportError;
use framelock_engine::media::{MediaFile, VideoElement};
use framelock_engine::mixer::SoftwareMixer;
use framelock_engine::session::{Session, Transport};
use framelock_test_harness::assertions::*;
use framelock_test_harness::builders::ClipBuilder;
use framelock_test_harness::fakes::{FakeLoader, FakeMedia, FakeVideoElement, RecordingSpeakers};

type TestSession = Session<SoftwareMixer, FakeVideoElement>;

fn session() -> TestSession {
    let mut config = EngineConfig::default();
    config.canvas = CanvasConfig {
        width: 32,
        height: 18,
    };
    Session::new(config, SoftwareMixer::new(8000))
}

fn loader() -> FakeLoader {
    FakeLoader::new()
        .with(
            "beach.mp4",
            FakeMedia::Video {
                width: 16,
                height: 9,
                rgba: [255, 0, 0, 255],
                duration: Some(10.0),
            },
        )
        .with(
            "title.png",
            FakeMedia::Image {
                width: 8,
                height: 8,
                rgba: [0, 255, 0, 255],
            },
        )
        .with(
            "tone.wav",
            FakeMedia::Audio {
                seconds: 5.0,
                sample_rate: 8000,
            },
        )
        .with("broken.mov", FakeMedia::Broken("moov atom not found".into()))
}

fn import(session: &mut TestSession, names: &[&str]) -> Vec<framelock_core::clip::Clip> {
    let files: Vec<MediaFile> = names.iter().map(MediaFile::new).collect();
    session.import(&mut loader(), &files).added
}

#[test]
fn test_import_appends_and_skips_failures() {
    let mut session = session();
    let files: Vec<MediaFile> = ["beach.mp4", "broken.mov", "title.png", "notes.txt", "tone.wav"]
        .iter()
        .map(MediaFile::new)
        .collect();
    let report = session.import(&mut loader(), &files);

    assert_eq!(report.added.len(), 3);
    assert_eq!(report.skipped.len(), 2);
    assert!(matches!(report.skipped[0], ImportError::LoadFailed { .. }));
    assert!(matches!(report.skipped[1], ImportError::Unsupported(_)));
    assert_eq!(session.media().len(), 3);

    let state = session.state();
    assert_track_clip_count(state, DEFAULT_VIDEO_TRACK, 2);
    assert_track_clip_count(state, DEFAULT_AUDIO_TRACK, 1);
    let video_track = &state.timeline.tracks()[DEFAULT_VIDEO_TRACK];
    assert_eq!(video_track.clips[0].duration, 10.0);
    assert_eq!(video_track.clips[1].start, 10.0);
    assert_eq!(video_track.clips[1].duration, 5.0);
    assert_state_valid(state);
}

#[test]
fn test_media_released_with_last_clip() {
    let mut session = session();
    let clip = import(&mut session, &["beach.mp4"]).remove(0);
    let media = clip.media;
    let copy = ClipBuilder::video(media).duration(2.0).build();
    let copy_id = copy.id;
    session
        .dispatch(Intent::AddClip { track: 0, clip: copy }, 0.0)
        .unwrap();

    session
        .dispatch(Intent::DeleteClip { clip: clip.id }, 0.0)
        .unwrap();
    assert!(session.media().contains(media));

    let applied = session
        .dispatch(Intent::DeleteClip { clip: copy_id }, 0.0)
        .unwrap();
    assert!(matches!(applied, Applied::ClipDeleted(_)));
    assert!(!session.media().contains(media));
    assert!(session.media().is_empty());
}

#[test]
fn test_playback_stops_and_rewinds_at_window_end() {
    let mut session = session();
    import(&mut session, &["beach.mp4"]);
    session
        .dispatch(Intent::SetProjectRange { start: 0.0, end: 2.0 }, 0.0)
        .unwrap();

    session.transport(Transport::Play, 0.0);
    let report = session.tick(1.0);
    assert_approx(report.position, 1.0, 1e-12);
    assert!(session.is_playing());

    let report = session.tick(2.5);
    assert_eq!(report.position, 0.0);
    assert!(!session.is_playing());
    assert!(session.scheduler().is_idle());
    assert_eq!(session.position(10.0), 0.0);
}

#[test]
fn test_video_follows_playhead_then_holds_when_paused() {
    let mut session = session();
    let clip = import(&mut session, &["beach.mp4"]).remove(0);

    session.transport(Transport::Play, 0.0);
    let report = session.tick(2.5);
    assert_eq!(report.sync.seeked, vec![clip.media]);
    let element = session.media().video(clip.media).unwrap();
    assert_approx(element.current_time(), 2.5, 1e-12);
    assert!(!element.is_paused());

    session.transport(Transport::Pause, 3.0);
    let report = session.tick(3.0);
    assert_eq!(report.position, 3.0);
    assert_eq!(report.sync.paused, vec![clip.media]);
    let element = session.media().video(clip.media).unwrap();
    assert!(element.is_paused());
    assert_approx(element.current_time(), 3.0, 1e-12);
}

#[test]
fn test_canvas_shows_active_clip() {
    let mut session = session();
    let clip = import(&mut session, &["beach.mp4", "title.png"]).remove(1);
    session
        .dispatch(Intent::Select { clip: Some(clip.id) }, 0.0)
        .unwrap();

    session.tick(0.0);
    assert_eq!(session.canvas().pixel(16, 9), [255, 0, 0, 255]);
    assert!(session.overlay().is_none());

    session.transport(Transport::Seek(11.0), 0.0);
    session.tick(0.0);
    assert_eq!(session.canvas().pixel(16, 9), [0, 255, 0, 255]);
    assert_eq!(session.overlay().map(|o| o.clip), Some(clip.id));
}

#[test]
fn test_fade_in_gain_during_playback_and_after_seek() {
    let mut session = session();
    let clip = import(&mut session, &["tone.wav"]).remove(0);
    session
        .dispatch(
            Intent::SetFades {
                clip: clip.id,
                fade_in: 5.0,
                fade_out: 0.0,
            },
            0.0,
        )
        .unwrap();

    session.transport(Transport::Play, 0.0);
    let gain = session.scheduler().voice_for(clip.id).unwrap().gain;
    assert_approx(session.graph().gain_value_at(gain, 2.5).unwrap(), 0.5, 1e-9);

    session.transport(Transport::Seek(4.0), 1.0);
    assert_eq!(session.scheduler().voices().len(), 1);
    let gain = session.scheduler().voice_for(clip.id).unwrap().gain;
    assert_approx(session.graph().gain_value_at(gain, 1.0).unwrap(), 0.8, 1e-9);
    assert_approx(session.graph().gain_value_at(gain, 1.5).unwrap(), 0.9, 1e-9);
    assert_eq!(session.graph().live_sources(), 1);
}

#[test]
fn test_edit_during_playback_reschedules_audio() {
    let mut session = session();
    let clip = import(&mut session, &["tone.wav"]).remove(0);
    session.transport(Transport::Play, 0.0);
    let before = session.scheduler().voice_for(clip.id).unwrap().gain;

    session
        .dispatch(Intent::Select { clip: Some(clip.id) }, 0.5)
        .unwrap();
    assert_eq!(session.scheduler().voice_for(clip.id).unwrap().gain, before);

    session
        .dispatch(
            Intent::SetVolume {
                clip: clip.id,
                volume: 0.25,
            },
            0.5,
        )
        .unwrap();
    let after = session.scheduler().voice_for(clip.id).unwrap().gain;
    assert_ne!(after, before);
    assert_approx(session.graph().gain_value_at(after, 1.0).unwrap(), 0.25, 1e-9);
    assert_eq!(session.graph().live_sources(), 1);
}

#[test]
fn test_rejected_edit_does_not_touch_playback() {
    let mut session = session();
    let clip = import(&mut session, &["tone.wav"]).remove(0);
    session.transport(Transport::Play, 0.0);
    let before = session.scheduler().voice_for(clip.id).unwrap().gain;

    assert!(
        session
            .dispatch(Intent::ChangeSpeed { clip: clip.id, rate: -1.0 }, 0.5)
            .is_err()
    );
    assert_eq!(session.scheduler().voice_for(clip.id).unwrap().gain, before);
}

#[test]
fn test_play_from_end_restarts_at_window_start() {
    let mut session = session();
    session
        .dispatch(Intent::SetProjectRange { start: 2.0, end: 6.0 }, 0.0)
        .unwrap();

    session.transport(Transport::Seek(100.0), 0.0);
    assert_eq!(session.position(0.0), 6.0);
    session.transport(Transport::Toggle, 1.0);
    assert!(session.is_playing());
    assert_eq!(session.position(1.0), 2.0);
    assert_approx(session.position(2.5), 3.5, 1e-12);

    session.transport(Transport::Toggle, 2.5);
    assert!(!session.is_playing());
    session.transport(Transport::Seek(4.0), 2.5);
    assert_eq!(session.position(2.5), 4.0);

    // Back to start also stops playback.
    session.transport(Transport::Play, 3.0);
    session.transport(Transport::ToStart, 3.5);
    assert!(!session.is_playing());
    assert!(session.scheduler().is_idle());
    assert_eq!(session.position(9.0), 2.0);
}

#[test]
fn test_seek_clamps_into_window() {
    let mut session = session();
    session
        .dispatch(Intent::SetProjectRange { start: 1.0, end: 5.0 }, 0.0)
        .unwrap();
    session.transport(Transport::Seek(-3.0), 0.0);
    assert_eq!(session.position(0.0), 1.0);
    session.transport(Transport::Seek(f64::NAN), 0.0);
    assert_eq!(session.position(0.0), 1.0);
}

#[test]
fn test_video_and_faded_audio_share_one_playhead() {
    let mut session = session();
    let mut loader = FakeLoader::new()
        .with(
            "shot.mp4",
            FakeMedia::Video {
                width: 16,
                height: 9,
                rgba: [255, 0, 0, 255],
                duration: Some(5.0),
            },
        )
        .with(
            "music.wav",
            FakeMedia::Audio {
                seconds: 4.0,
                sample_rate: 8000,
            },
        );
    let files = [MediaFile::new("shot.mp4"), MediaFile::new("music.wav")];
    let added = session.import(&mut loader, &files).added;
    let (video, audio) = (added[0].clone(), added[1].clone());
    session
        .dispatch(
            Intent::MoveClip {
                clip: audio.id,
                track: DEFAULT_AUDIO_TRACK,
                start: 2.0,
            },
            0.0,
        )
        .unwrap();
    session
        .dispatch(
            Intent::SetFades {
                clip: audio.id,
                fade_in: 1.0,
                fade_out: 0.0,
            },
            0.0,
        )
        .unwrap();

    session.transport(Transport::Play, 0.0);
    let report = session.tick(2.5);
    assert_approx(report.position, 2.5, 1e-12);

    let voice = session.scheduler().voice_for(audio.id).unwrap();
    assert_approx(voice.start, 2.0, 1e-9);
    let gain = session.graph().gain_value_at(voice.gain, 2.5).unwrap();
    assert_approx(gain, 0.5, 1e-9);

    let element = session.media().video(video.media).unwrap();
    assert_approx(element.current_time(), 2.5, 1e-12);
}

#[test]
fn test_seek_to_window_end_while_playing_rewinds_to_start() {
    let mut session = session();
    import(&mut session, &["tone.wav"]);
    session
        .dispatch(Intent::SetProjectRange { start: 2.0, end: 6.0 }, 0.0)
        .unwrap();

    session.transport(Transport::Play, 0.0);
    assert_eq!(session.position(0.0), 2.0);
    assert!(!session.scheduler().is_idle());

    session.transport(Transport::Seek(6.0), 1.0);
    assert!(!session.is_playing());
    assert!(session.scheduler().is_idle());
    assert_eq!(session.graph().live_sources(), 0);
    assert_eq!(session.position(1.0), 2.0);
    assert_eq!(session.position(5.0), 2.0);
}

#[test]
fn test_window_moved_past_playhead_reanchors_playback() {
    let mut session = session();
    let tone = import(&mut session, &["tone.wav"]).remove(0);
    let intro = ClipBuilder::audio(tone.media).duration(1.5).build();
    let intro_id = intro.id;
    session
        .dispatch(
            Intent::AddClip {
                track: DEFAULT_AUDIO_TRACK + 1,
                clip: intro,
            },
            0.0,
        )
        .unwrap();

    session.transport(Transport::Play, 0.0);
    assert_eq!(session.scheduler().voices().len(), 2);
    session.tick(1.0);

    session
        .dispatch(Intent::SetProjectRange { start: 2.0, end: 8.0 }, 1.0)
        .unwrap();
    assert!(session.is_playing());
    assert_eq!(session.position(1.0), 2.0);
    assert_approx(session.position(1.5), 2.5, 1e-12);

    // Only the part of the tone inside the window is scheduled.
    assert!(session.scheduler().voice_for(intro_id).is_none());
    let voice = session.scheduler().voice_for(tone.id).unwrap();
    assert_approx(voice.start, 1.0, 1e-9);
    assert_approx(voice.end, 4.0, 1e-9);
    assert_eq!(session.graph().live_sources(), 1);
}

#[test]
fn test_playback_is_heard_until_paused() {
    let speakers = RecordingSpeakers::new();
    let mut session: TestSession = Session::new(
        EngineConfig::default(),
        SoftwareMixer::with_speakers(8000, Box::new(speakers.clone())),
    );
    import(&mut session, &["tone.wav"]);

    session.transport(Transport::Play, 0.0);
    session.tick(0.5);
    session.transport(Transport::Pause, 0.5);
    session.tick(1.0);

    let blocks = speakers.blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].len(), 4000 * 2);
    assert!(blocks[0].iter().any(|s| s.abs() > 0.1));
    assert_eq!(blocks[1].len(), 4000 * 2);
    assert!(blocks[1].iter().all(|s| *s == 0.0));
}
