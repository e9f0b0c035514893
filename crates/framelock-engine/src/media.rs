//! Decoded media resources and the pool that owns them.
//!
//! Video decoding stays behind [`VideoElement`]: the engine only seeks,
//! plays, pauses and reads the current frame. Stills and audio are held
//! fully decoded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use framelock_core::media::{MediaId, MediaInfo, MediaKind};

use crate::error::ImportError;
use crate::frame::FrameBuffer;

/// Anything the compositor can draw.
pub trait FrameSource {
    fn natural_size(&self) -> (u32, u32);
    /// The frame currently presented, if one is decoded.
    fn current_frame(&self) -> Option<&FrameBuffer>;
}

/// A seekable, playable video decoder with its own internal clock.
pub trait VideoElement: FrameSource {
    /// Native duration in seconds, if known.
    fn duration(&self) -> Option<f64>;
    fn current_time(&self) -> f64;
    fn seek(&mut self, time: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);

    /// Bring the presented frame up to `current_time`. Elements that decode
    /// on their own keep the default no-op.
    fn present(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct StillImage {
    pub frame: FrameBuffer,
}

impl StillImage {
    pub fn new(frame: FrameBuffer) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillImage {
    fn natural_size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn current_frame(&self) -> Option<&FrameBuffer> {
        Some(&self.frame)
    }
}

/// Fully decoded PCM, interleaved `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Linearly interpolated sample of `channel` at `time` seconds.
    /// Mono buffers feed every output channel. Silence outside the buffer.
    pub fn sample_at(&self, time: f64, channel: usize) -> f32 {
        let frames = self.frames();
        if frames == 0 || !time.is_finite() || time < 0.0 {
            return 0.0;
        }
        let channels = self.channels as usize;
        let channel = channel.min(channels - 1);
        let pos = time * f64::from(self.sample_rate);
        let i = pos.floor() as usize;
        if i >= frames {
            return 0.0;
        }
        let frac = (pos - i as f64) as f32;
        let a = self.samples[i * channels + channel];
        let b = if i + 1 < frames {
            self.samples[(i + 1) * channels + channel]
        } else {
            0.0
        };
        a + (b - a) * frac
    }
}

/// What a loader produces for one file.
#[derive(Debug)]
pub enum LoadedMedia<V> {
    Video(V),
    Image(StillImage),
    Audio(AudioBuffer),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub name: String,
    pub path: PathBuf,
}

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }
}

/// Platform decoding of imported files.
pub trait MediaLoader {
    type Element: VideoElement;

    fn load(&mut self, file: &MediaFile) -> Result<LoadedMedia<Self::Element>, ImportError>;
}

pub enum MediaResource<V> {
    Video(V),
    Image(StillImage),
    Audio(Arc<AudioBuffer>),
}

pub struct MediaEntry<V> {
    pub info: MediaInfo,
    pub resource: MediaResource<V>,
}

/// Owns every loaded media resource, keyed by [`MediaId`].
pub struct MediaPool<V> {
    entries: HashMap<MediaId, MediaEntry<V>>,
}

impl<V> Default for MediaPool<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: VideoElement> MediaPool<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded resource and describe it.
    pub fn insert(&mut self, name: impl Into<String>, loaded: LoadedMedia<V>) -> (MediaId, MediaInfo) {
        let name = name.into();
        let (info, resource) = match loaded {
            LoadedMedia::Video(element) => {
                let (w, h) = element.natural_size();
                (
                    MediaInfo::video(name, element.duration(), w, h),
                    MediaResource::Video(element),
                )
            }
            LoadedMedia::Image(image) => {
                let (w, h) = image.natural_size();
                (MediaInfo::image(name, w, h), MediaResource::Image(image))
            }
            LoadedMedia::Audio(buffer) => (
                MediaInfo::audio(name, buffer.duration()),
                MediaResource::Audio(Arc::new(buffer)),
            ),
        };
        let id = MediaId::new();
        self.entries.insert(
            id,
            MediaEntry {
                info: info.clone(),
                resource,
            },
        );
        (id, info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MediaId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn info(&self, id: MediaId) -> Option<&MediaInfo> {
        self.entries.get(&id).map(|e| &e.info)
    }

    pub fn kind(&self, id: MediaId) -> Option<MediaKind> {
        self.info(id).map(|i| i.kind)
    }

    pub fn video(&self, id: MediaId) -> Option<&V> {
        match self.entries.get(&id).map(|e| &e.resource) {
            Some(MediaResource::Video(v)) => Some(v),
            _ => None,
        }
    }

    pub fn video_mut(&mut self, id: MediaId) -> Option<&mut V> {
        match self.entries.get_mut(&id).map(|e| &mut e.resource) {
            Some(MediaResource::Video(v)) => Some(v),
            _ => None,
        }
    }

    pub fn audio_buffer(&self, id: MediaId) -> Option<&Arc<AudioBuffer>> {
        match self.entries.get(&id).map(|e| &e.resource) {
            Some(MediaResource::Audio(b)) => Some(b),
            _ => None,
        }
    }

    pub fn frame_source(&self, id: MediaId) -> Option<&dyn FrameSource> {
        match self.entries.get(&id).map(|e| &e.resource) {
            Some(MediaResource::Video(v)) => Some(v as &dyn FrameSource),
            Some(MediaResource::Image(i)) => Some(i as &dyn FrameSource),
            _ => None,
        }
    }

    /// Every video element, for pausing ones no clip is showing.
    pub fn videos_mut(&mut self) -> impl Iterator<Item = (MediaId, &mut V)> {
        self.entries
            .iter_mut()
            .filter_map(|(id, e)| match &mut e.resource {
                MediaResource::Video(v) => Some((*id, v)),
                _ => None,
            })
    }

    pub fn remove(&mut self, id: MediaId) -> Option<MediaEntry<V>> {
        self.entries.remove(&id)
    }
}
