//! In-memory stand-ins for the platform pieces the engine drives.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use framelock_core::gesture::PointerCapture;
use framelock_engine::encoder::{Encoder, EncoderSettings, ExportProfile};
use framelock_engine::error::{EngineError, GraphError, ImportError};
use framelock_engine::frame::FrameBuffer;
use framelock_engine::graph::{AudioGraph, BiquadKind, Destination, NodeId};
use framelock_engine::media::{
    AudioBuffer, FrameSource, LoadedMedia, MediaFile, MediaLoader, StillImage, VideoElement,
};
use framelock_engine::speakers::SpeakerSink;

use crate::fixtures::sine_buffer;

/// A video element whose frame is a solid colour and whose clock only
/// moves when the test calls [`FakeVideoElement::advance`].
#[derive(Debug, Clone)]
pub struct FakeVideoElement {
    frame: FrameBuffer,
    duration: Option<f64>,
    time: f64,
    paused: bool,
    rate: f64,
    pub seeks: u32,
}

impl FakeVideoElement {
    pub fn new(width: u32, height: u32, rgba: [u8; 4], duration: Option<f64>) -> Self {
        Self {
            frame: FrameBuffer::solid(width, height, rgba),
            duration,
            time: 0.0,
            paused: true,
            rate: 1.0,
            seeks: 0,
        }
    }

    /// Let `secs` of wall time pass; a playing element advances at its rate.
    pub fn advance(&mut self, secs: f64) {
        if !self.paused {
            self.time += secs * self.rate;
        }
    }
}

impl FrameSource for FakeVideoElement {
    fn natural_size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn current_frame(&self) -> Option<&FrameBuffer> {
        Some(&self.frame)
    }
}

impl VideoElement for FakeVideoElement {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn seek(&mut self, time: f64) {
        self.time = time;
        self.seeks += 1;
    }

    fn play(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }
}

/// What [`FakeLoader`] returns for a file name.
#[derive(Debug, Clone)]
pub enum FakeMedia {
    Video {
        width: u32,
        height: u32,
        rgba: [u8; 4],
        duration: Option<f64>,
    },
    Image {
        width: u32,
        height: u32,
        rgba: [u8; 4],
    },
    Audio {
        seconds: f64,
        sample_rate: u32,
    },
    Broken(String),
}

#[derive(Debug, Default)]
pub struct FakeLoader {
    files: HashMap<String, FakeMedia>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, media: FakeMedia) -> Self {
        self.files.insert(name.to_string(), media);
        self
    }
}

impl MediaLoader for FakeLoader {
    type Element = FakeVideoElement;

    fn load(&mut self, file: &MediaFile) -> Result<LoadedMedia<FakeVideoElement>, ImportError> {
        match self.files.get(&file.name) {
            Some(FakeMedia::Video {
                width,
                height,
                rgba,
                duration,
            }) => Ok(LoadedMedia::Video(FakeVideoElement::new(
                *width, *height, *rgba, *duration,
            ))),
            Some(FakeMedia::Image {
                width,
                height,
                rgba,
            }) => Ok(LoadedMedia::Image(StillImage::new(FrameBuffer::solid(
                *width, *height, *rgba,
            )))),
            Some(FakeMedia::Audio {
                seconds,
                sample_rate,
            }) => Ok(LoadedMedia::Audio(sine_buffer(440.0, *seconds, *sample_rate))),
            Some(FakeMedia::Broken(reason)) => Err(ImportError::LoadFailed {
                name: file.name.clone(),
                reason: reason.clone(),
            }),
            None => Err(ImportError::Unsupported(file.name.clone())),
        }
    }
}

/// Everything a [`MemoryEncoder`] was fed.
#[derive(Debug, Default, Clone)]
pub struct EncoderLog {
    pub profile: Option<ExportProfile>,
    pub settings: Option<EncoderSettings>,
    pub frames: u64,
    /// Centre pixel of each pushed frame.
    pub frame_samples: Vec<[u8; 4]>,
    pub audio: Vec<f32>,
    pub stopped: bool,
}

/// An encoder that records its input and emits a small fake file.
pub struct MemoryEncoder {
    supported: Vec<String>,
    log: Rc<RefCell<EncoderLog>>,
}

impl MemoryEncoder {
    pub fn supporting(mime_types: &[&str]) -> Self {
        Self {
            supported: mime_types.iter().map(|m| m.to_string()).collect(),
            log: Rc::new(RefCell::new(EncoderLog::default())),
        }
    }

    /// Shared handle to the log; keep it before boxing the encoder.
    pub fn log(&self) -> Rc<RefCell<EncoderLog>> {
        Rc::clone(&self.log)
    }
}

impl Encoder for MemoryEncoder {
    fn is_supported(&self, profile: &ExportProfile) -> bool {
        self.supported.iter().any(|m| m == profile.mime_type())
    }

    fn start(
        &mut self,
        profile: &ExportProfile,
        settings: &EncoderSettings,
    ) -> framelock_engine::error::Result<()> {
        let mut log = self.log.borrow_mut();
        log.profile = Some(profile.clone());
        log.settings = Some(*settings);
        Ok(())
    }

    fn push_video_frame(&mut self, frame: &FrameBuffer) -> framelock_engine::error::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.profile.is_none() {
            return Err(EngineError::Encoder("not started".to_string()));
        }
        log.frames += 1;
        log.frame_samples
            .push(frame.pixel(frame.width / 2, frame.height / 2));
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> framelock_engine::error::Result<()> {
        self.log.borrow_mut().audio.extend_from_slice(samples);
        Ok(())
    }

    fn stop(&mut self, on_chunk: &mut dyn FnMut(Vec<u8>)) -> framelock_engine::error::Result<()> {
        let mut log = self.log.borrow_mut();
        log.stopped = true;
        on_chunk(b"FAKE".to_vec());
        on_chunk(log.frames.to_le_bytes().to_vec());
        Ok(())
    }
}

/// Speakers that keep every block the mixer queued.
#[derive(Debug, Clone, Default)]
pub struct RecordingSpeakers {
    blocks: Rc<RefCell<Vec<Vec<f32>>>>,
}

impl RecordingSpeakers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks queued so far, oldest first.
    pub fn blocks(&self) -> Vec<Vec<f32>> {
        self.blocks.borrow().clone()
    }
}

impl SpeakerSink for RecordingSpeakers {
    fn queue(&mut self, samples: Vec<f32>, _sample_rate: u32, _channels: u16) {
        self.blocks.borrow_mut().push(samples);
    }
}

/// Pointer capture that counts its releases.
#[derive(Debug, Clone, Default)]
pub struct CountingCapture {
    releases: Rc<Cell<u32>>,
}

impl CountingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn releases(&self) -> u32 {
        self.releases.get()
    }
}

impl PointerCapture for CountingCapture {
    fn release(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }
}

/// Wraps a graph and makes selected `start` calls fail, counted from 0.
pub struct FlakyGraph<G> {
    pub inner: G,
    fail_starts: HashSet<usize>,
    starts: usize,
}

impl<G: AudioGraph> FlakyGraph<G> {
    pub fn new(inner: G, fail_starts: &[usize]) -> Self {
        Self {
            inner,
            fail_starts: fail_starts.iter().copied().collect(),
            starts: 0,
        }
    }
}

impl<G: AudioGraph> AudioGraph for FlakyGraph<G> {
    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn create_buffer_source(&mut self, buffer: Arc<AudioBuffer>, playback_rate: f64) -> NodeId {
        self.inner.create_buffer_source(buffer, playback_rate)
    }

    fn create_gain(&mut self, value: f64) -> NodeId {
        self.inner.create_gain(value)
    }

    fn create_biquad(&mut self, kind: BiquadKind, frequency: f64, q: f64) -> NodeId {
        self.inner.create_biquad(kind, frequency, q)
    }

    fn create_delay(&mut self, delay: f64) -> NodeId {
        self.inner.create_delay(delay)
    }

    fn set_gain_at(&mut self, node: NodeId, value: f64, time: f64) -> Result<(), GraphError> {
        self.inner.set_gain_at(node, value, time)
    }

    fn ramp_gain_to(&mut self, node: NodeId, value: f64, time: f64) -> Result<(), GraphError> {
        self.inner.ramp_gain_to(node, value, time)
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.inner.connect(from, to)
    }

    fn connect_to(&mut self, from: NodeId, destination: Destination) -> Result<(), GraphError> {
        self.inner.connect_to(from, destination)
    }

    fn disconnect(&mut self, node: NodeId) {
        self.inner.disconnect(node)
    }

    fn start(
        &mut self,
        source: NodeId,
        when: f64,
        offset: f64,
        duration: f64,
    ) -> Result<(), GraphError> {
        let call = self.starts;
        self.starts += 1;
        if self.fail_starts.contains(&call) {
            return Err(GraphError::InvalidState(format!("injected failure #{call}")));
        }
        self.inner.start(source, when, offset, duration)
    }

    fn stop(&mut self, source: NodeId) -> Result<(), GraphError> {
        self.inner.stop(source)
    }

    fn create_capture(&mut self) -> Destination {
        self.inner.create_capture()
    }

    fn take_captured(&mut self, destination: Destination) -> Vec<f32> {
        self.inner.take_captured(destination)
    }

    fn close_capture(&mut self, destination: Destination) {
        self.inner.close_capture(destination)
    }

    fn render_until(&mut self, time: f64) {
        self.inner.render_until(time)
    }
}
