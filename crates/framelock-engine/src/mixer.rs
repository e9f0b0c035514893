//! Software implementation of [`AudioGraph`].
//!
//! The mixer owns a device clock that only moves when `render_until` is
//! called. Nodes feeding a capture sink, or the speakers when a
//! [`SpeakerSink`] is attached, are rendered sample by sample; with neither
//! the clock just advances.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::sync::Arc;

use tracing::trace;

use crate::automation::ParamTimeline;
use crate::error::GraphError;
use crate::graph::{AudioGraph, BiquadKind, Destination, NodeId};
use crate::media::AudioBuffer;
use crate::speakers::SpeakerSink;

pub const MIXER_CHANNELS: usize = 2;

type Frame = [f64; MIXER_CHANNELS];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceState {
    Idle,
    Started { when: f64, offset: f64, duration: f64 },
    Stopped { when: f64, offset: f64, duration: f64, at: f64 },
}

#[derive(Debug)]
struct SourceNode {
    buffer: Arc<AudioBuffer>,
    rate: f64,
    state: SourceState,
}

impl SourceNode {
    fn sample(&self, t: f64) -> Frame {
        let (when, offset, duration, stop) = match self.state {
            SourceState::Idle => return [0.0; MIXER_CHANNELS],
            SourceState::Started {
                when,
                offset,
                duration,
            } => (when, offset, duration, f64::INFINITY),
            SourceState::Stopped {
                when,
                offset,
                duration,
                at,
            } => (when, offset, duration, at),
        };
        let end = when + duration / self.rate;
        if t < when || t >= end || t >= stop {
            return [0.0; MIXER_CHANNELS];
        }
        let pos = offset + (t - when) * self.rate;
        std::array::from_fn(|ch| f64::from(self.buffer.sample_at(pos, ch)))
    }
}

/// RBJ cookbook biquad, direct form I, one state per channel.
#[derive(Debug)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    x: [[f64; 2]; MIXER_CHANNELS],
    y: [[f64; 2]; MIXER_CHANNELS],
}

impl Biquad {
    fn new(kind: BiquadKind, frequency: f64, q: f64, sample_rate: u32) -> Self {
        let w0 = 2.0 * PI * frequency / f64::from(sample_rate);
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(1e-4));
        let (b0, b1, b2) = match kind {
            BiquadKind::Lowpass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            BiquadKind::Highpass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };
        let a0 = 1.0 + alpha;
        Self {
            b: [b0 / a0, b1 / a0, b2 / a0],
            a: [-2.0 * cos / a0, (1.0 - alpha) / a0],
            x: [[0.0; 2]; MIXER_CHANNELS],
            y: [[0.0; 2]; MIXER_CHANNELS],
        }
    }

    fn process(&mut self, input: Frame) -> Frame {
        std::array::from_fn(|ch| {
            let [x1, x2] = self.x[ch];
            let [y1, y2] = self.y[ch];
            let out = self.b[0] * input[ch] + self.b[1] * x1 + self.b[2] * x2
                - self.a[0] * y1
                - self.a[1] * y2;
            self.x[ch] = [input[ch], x1];
            self.y[ch] = [out, y1];
            out
        })
    }
}

#[derive(Debug)]
struct DelayLine {
    buffer: Vec<Frame>,
    pos: usize,
}

impl DelayLine {
    fn new(delay: f64, sample_rate: u32) -> Self {
        let len = (delay * f64::from(sample_rate)).round().max(1.0) as usize;
        Self {
            buffer: vec![[0.0; MIXER_CHANNELS]; len],
            pos: 0,
        }
    }

    fn read(&self) -> Frame {
        self.buffer[self.pos]
    }

    fn write(&mut self, input: Frame) {
        self.buffer[self.pos] = input;
        self.pos = (self.pos + 1) % self.buffer.len();
    }
}

#[derive(Debug)]
enum NodeKind {
    Source(SourceNode),
    Gain(ParamTimeline),
    Biquad(Biquad),
    Delay(DelayLine),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    inputs: Vec<NodeId>,
    destinations: Vec<Destination>,
}

/// A software mixer rendering stereo `f32` at a fixed sample rate.
#[derive(Debug)]
pub struct SoftwareMixer {
    sample_rate: u32,
    frame_cursor: u64,
    next_id: u64,
    next_capture: u64,
    nodes: HashMap<NodeId, Node>,
    captures: HashMap<u64, Vec<f32>>,
    speakers: Option<Box<dyn SpeakerSink>>,
    /// Speaker mix rendered since the last hand-off to the sink.
    speaker_block: Vec<f32>,
    /// Render order, rebuilt when the topology changes.
    order: Option<Vec<NodeId>>,
}

impl SoftwareMixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frame_cursor: 0,
            next_id: 0,
            next_capture: 0,
            nodes: HashMap::new(),
            captures: HashMap::new(),
            speakers: None,
            speaker_block: Vec::new(),
            order: None,
        }
    }

    /// A mixer whose speaker destination feeds `sink`.
    pub fn with_speakers(sample_rate: u32, sink: Box<dyn SpeakerSink>) -> Self {
        let mut mixer = Self::new(sample_rate);
        mixer.attach_speakers(sink);
        mixer
    }

    pub fn attach_speakers(&mut self, sink: Box<dyn SpeakerSink>) {
        self.speakers = Some(sink);
        self.order = None;
    }

    pub fn detach_speakers(&mut self) -> Option<Box<dyn SpeakerSink>> {
        self.order = None;
        self.speaker_block.clear();
        self.speakers.take()
    }

    pub fn has_speakers(&self) -> bool {
        self.speakers.is_some()
    }

    fn is_rendering(&self) -> bool {
        !self.captures.is_empty() || self.speakers.is_some()
    }

    fn feeds_output(&self, destination: &Destination) -> bool {
        match destination {
            Destination::Speakers => self.speakers.is_some(),
            Destination::Capture(c) => self.captures.contains_key(c),
        }
    }

    /// Scheduled gain of `node` at device time `t`.
    pub fn gain_value_at(&self, node: NodeId, t: f64) -> Option<f64> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Gain(param)) => Some(param.value_at(t)),
            _ => None,
        }
    }

    pub fn source_state(&self, node: NodeId) -> Option<SourceState> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Source(s)) => Some(s.state),
            _ => None,
        }
    }

    /// Sources started and not yet stopped.
    pub fn live_sources(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| {
                matches!(
                    n.kind,
                    NodeKind::Source(SourceNode {
                        state: SourceState::Started { .. },
                        ..
                    })
                )
            })
            .count()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes upstream of `node`, direct inputs only.
    pub fn inputs_of(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.inputs.clone())
            .unwrap_or_default()
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                inputs: Vec::new(),
                destinations: Vec::new(),
            },
        );
        self.order = None;
        id
    }

    fn gain_param(&mut self, node: NodeId) -> Result<&mut ParamTimeline, GraphError> {
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(NodeKind::Gain(param)) => Ok(param),
            Some(_) => Err(GraphError::InvalidState(format!("node {} is not a gain", node.0))),
            None => Err(GraphError::UnknownNode(node.0)),
        }
    }

    fn source_mut(&mut self, node: NodeId) -> Result<&mut SourceNode, GraphError> {
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(NodeKind::Source(source)) => Ok(source),
            Some(_) => Err(GraphError::InvalidState(format!("node {} is not a source", node.0))),
            None => Err(GraphError::UnknownNode(node.0)),
        }
    }

    /// Nodes feeding an open output, inputs before consumers. Edges into a delay
    /// are not followed: its output comes from earlier frames, which is what
    /// lets feedback loops render.
    fn render_order(&self) -> Vec<NodeId> {
        fn visit(
            id: NodeId,
            nodes: &HashMap<NodeId, Node>,
            visited: &mut HashSet<NodeId>,
            order: &mut Vec<NodeId>,
            pending: &mut Vec<NodeId>,
        ) {
            let Some(node) = nodes.get(&id) else {
                return;
            };
            if !visited.insert(id) {
                return;
            }
            if matches!(node.kind, NodeKind::Delay(_)) {
                pending.extend(node.inputs.iter().copied());
            } else {
                for input in &node.inputs {
                    visit(*input, nodes, visited, order, pending);
                }
            }
            order.push(id);
        }

        let mut pending: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.destinations.iter().any(|d| self.feeds_output(d)))
            .map(|(id, _)| *id)
            .collect();
        pending.sort();

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        while let Some(id) = pending.pop() {
            visit(id, &self.nodes, &mut visited, &mut order, &mut pending);
        }
        order
    }

    fn render_frame(&mut self, order: &[NodeId], t: f64, outputs: &mut HashMap<NodeId, Frame>) {
        outputs.clear();
        for id in order {
            let input = match self.nodes.get(id) {
                Some(node) => sum_inputs(&node.inputs, outputs),
                None => continue,
            };
            let out = match self.nodes.get_mut(id).map(|n| &mut n.kind) {
                Some(NodeKind::Source(source)) => source.sample(t),
                Some(NodeKind::Gain(param)) => {
                    let g = param.value_at(t);
                    input.map(|v| v * g)
                }
                Some(NodeKind::Biquad(filter)) => filter.process(input),
                Some(NodeKind::Delay(line)) => line.read(),
                None => continue,
            };
            outputs.insert(*id, out);
        }

        // Feed delays once every node has produced this frame.
        for id in order {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if let NodeKind::Delay(line) = &mut node.kind {
                line.write(sum_inputs(&node.inputs, outputs));
            }
        }

        let mut mixed: HashMap<u64, Frame> = self
            .captures
            .keys()
            .map(|c| (*c, [0.0; MIXER_CHANNELS]))
            .collect();
        let mut speakers = [0.0; MIXER_CHANNELS];
        for id in order {
            let (Some(node), Some(frame)) = (self.nodes.get(id), outputs.get(id)) else {
                continue;
            };
            for dest in &node.destinations {
                let acc = match dest {
                    Destination::Speakers => &mut speakers,
                    Destination::Capture(c) => match mixed.get_mut(c) {
                        Some(acc) => acc,
                        None => continue,
                    },
                };
                for ch in 0..MIXER_CHANNELS {
                    acc[ch] += frame[ch];
                }
            }
        }
        for (c, frame) in mixed {
            if let Some(samples) = self.captures.get_mut(&c) {
                samples.extend(frame.iter().map(|v| *v as f32));
            }
        }
        if self.speakers.is_some() {
            self.speaker_block
                .extend(speakers.iter().map(|v| *v as f32));
        }
    }

    fn flush_speakers(&mut self) {
        if self.speaker_block.is_empty() {
            return;
        }
        let block = std::mem::take(&mut self.speaker_block);
        if let Some(sink) = self.speakers.as_mut() {
            trace!(samples = block.len(), "queued speaker block");
            sink.queue(block, self.sample_rate, MIXER_CHANNELS as u16);
        }
    }

    fn mix_outputs(&mut self, frames: u64) {
        let order = match self.order.take() {
            Some(order) => order,
            None => self.render_order(),
        };
        let mut outputs = HashMap::new();
        for i in 0..frames {
            let t = (self.frame_cursor + i) as f64 / f64::from(self.sample_rate);
            self.render_frame(&order, t, &mut outputs);
        }
        self.order = Some(order);
    }
}

fn sum_inputs(inputs: &[NodeId], outputs: &HashMap<NodeId, Frame>) -> Frame {
    inputs.iter().fold([0.0; MIXER_CHANNELS], |mut acc, input| {
        if let Some(frame) = outputs.get(input) {
            for ch in 0..MIXER_CHANNELS {
                acc[ch] += frame[ch];
            }
        }
        acc
    })
}

impl AudioGraph for SoftwareMixer {
    fn current_time(&self) -> f64 {
        self.frame_cursor as f64 / f64::from(self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        MIXER_CHANNELS as u16
    }

    fn create_buffer_source(&mut self, buffer: Arc<AudioBuffer>, playback_rate: f64) -> NodeId {
        self.add_node(NodeKind::Source(SourceNode {
            buffer,
            rate: if playback_rate > 0.0 { playback_rate } else { 1.0 },
            state: SourceState::Idle,
        }))
    }

    fn create_gain(&mut self, value: f64) -> NodeId {
        self.add_node(NodeKind::Gain(ParamTimeline::new(value)))
    }

    fn create_biquad(&mut self, kind: BiquadKind, frequency: f64, q: f64) -> NodeId {
        self.add_node(NodeKind::Biquad(Biquad::new(kind, frequency, q, self.sample_rate)))
    }

    fn create_delay(&mut self, delay: f64) -> NodeId {
        self.add_node(NodeKind::Delay(DelayLine::new(delay, self.sample_rate)))
    }

    fn set_gain_at(&mut self, node: NodeId, value: f64, time: f64) -> Result<(), GraphError> {
        self.gain_param(node)?.set_value_at(value, time);
        Ok(())
    }

    fn ramp_gain_to(&mut self, node: NodeId, value: f64, time: f64) -> Result<(), GraphError> {
        self.gain_param(node)?.linear_ramp_to(value, time);
        Ok(())
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&from) {
            return Err(GraphError::UnknownNode(from.0));
        }
        let target = self.nodes.get_mut(&to).ok_or(GraphError::UnknownNode(to.0))?;
        if !target.inputs.contains(&from) {
            target.inputs.push(from);
        }
        self.order = None;
        Ok(())
    }

    fn connect_to(&mut self, from: NodeId, destination: Destination) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&from).ok_or(GraphError::UnknownNode(from.0))?;
        if !node.destinations.contains(&destination) {
            node.destinations.push(destination);
        }
        self.order = None;
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) {
        if self.nodes.remove(&node).is_some() {
            for other in self.nodes.values_mut() {
                other.inputs.retain(|i| *i != node);
            }
            self.order = None;
        }
    }

    fn start(
        &mut self,
        source: NodeId,
        when: f64,
        offset: f64,
        duration: f64,
    ) -> Result<(), GraphError> {
        let valid = [when, offset, duration]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        if !valid {
            return Err(GraphError::InvalidTiming {
                when,
                offset,
                duration,
            });
        }
        let now = self.current_time();
        let node = self.source_mut(source)?;
        if node.state != SourceState::Idle {
            return Err(GraphError::InvalidState(format!(
                "source {} already started",
                source.0
            )));
        }
        // A start time in the past plays from `offset` right away.
        node.state = SourceState::Started {
            when: when.max(now),
            offset,
            duration,
        };
        trace!(source = source.0, when, offset, duration, "source started");
        Ok(())
    }

    fn stop(&mut self, source: NodeId) -> Result<(), GraphError> {
        let now = self.current_time();
        let node = self.source_mut(source)?;
        match node.state {
            SourceState::Started {
                when,
                offset,
                duration,
            } => {
                node.state = SourceState::Stopped {
                    when,
                    offset,
                    duration,
                    at: now,
                };
                Ok(())
            }
            SourceState::Idle => Err(GraphError::InvalidState(format!(
                "source {} was never started",
                source.0
            ))),
            SourceState::Stopped { .. } => Err(GraphError::InvalidState(format!(
                "source {} already stopped",
                source.0
            ))),
        }
    }

    fn create_capture(&mut self) -> Destination {
        let id = self.next_capture;
        self.next_capture += 1;
        self.captures.insert(id, Vec::new());
        self.order = None;
        Destination::Capture(id)
    }

    fn take_captured(&mut self, destination: Destination) -> Vec<f32> {
        match destination {
            Destination::Capture(c) => self
                .captures
                .get_mut(&c)
                .map(std::mem::take)
                .unwrap_or_default(),
            Destination::Speakers => Vec::new(),
        }
    }

    fn close_capture(&mut self, destination: Destination) {
        if let Destination::Capture(c) = destination {
            self.captures.remove(&c);
            self.order = None;
        }
    }

    fn render_until(&mut self, time: f64) {
        if !time.is_finite() {
            return;
        }
        let target = (time * f64::from(self.sample_rate)).floor().max(0.0) as u64;
        if target <= self.frame_cursor {
            return;
        }
        if self.is_rendering() {
            self.mix_outputs(target - self.frame_cursor);
        }
        self.frame_cursor = target;
        self.flush_speakers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dc_buffer(seconds: f64, sample_rate: u32) -> Arc<AudioBuffer> {
        let frames = (seconds * f64::from(sample_rate)) as usize;
        Arc::new(AudioBuffer::new(sample_rate, 1, vec![1.0; frames]))
    }

    #[test]
    fn test_clock_advances_without_capture() {
        let mut mixer = SoftwareMixer::new(100);
        mixer.render_until(2.5);
        assert_eq!(mixer.current_time(), 2.5);
        mixer.render_until(1.0);
        assert_eq!(mixer.current_time(), 2.5);
    }

    #[test]
    fn test_source_renders_into_capture() {
        let mut mixer = SoftwareMixer::new(100);
        let capture = mixer.create_capture();
        let src = mixer.create_buffer_source(dc_buffer(1.0, 100), 1.0);
        let gain = mixer.create_gain(0.5);
        mixer.connect(src, gain).unwrap();
        mixer.connect_to(gain, capture).unwrap();
        mixer.start(src, 0.1, 0.0, 0.2).unwrap();
        mixer.render_until(0.5);

        let samples = mixer.take_captured(capture);
        assert_eq!(samples.len(), 50 * MIXER_CHANNELS);
        let frame = |i: usize| samples[i * MIXER_CHANNELS];
        assert_eq!(frame(5), 0.0);
        assert_eq!(frame(15), 0.5);
        assert_eq!(frame(35), 0.0);
        assert!(mixer.take_captured(capture).is_empty());
    }

    #[test]
    fn test_playback_rate_shortens_output() {
        let mut mixer = SoftwareMixer::new(100);
        let capture = mixer.create_capture();
        let src = mixer.create_buffer_source(dc_buffer(2.0, 100), 2.0);
        mixer.connect_to(src, capture).unwrap();
        // Two source seconds at double speed take one device second.
        mixer.start(src, 0.0, 0.0, 2.0).unwrap();
        mixer.render_until(1.5);
        let samples = mixer.take_captured(capture);
        assert_eq!(samples[90 * MIXER_CHANNELS], 1.0);
        assert_eq!(samples[110 * MIXER_CHANNELS], 0.0);
    }

    #[test]
    fn test_gain_ramp() {
        let mut mixer = SoftwareMixer::new(100);
        let gain = mixer.create_gain(1.0);
        mixer.set_gain_at(gain, 0.0, 1.0).unwrap();
        mixer.ramp_gain_to(gain, 1.0, 2.0).unwrap();
        assert_eq!(mixer.gain_value_at(gain, 1.5), Some(0.5));
        assert!(mixer.set_gain_at(NodeId(999), 1.0, 0.0).is_err());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut mixer = SoftwareMixer::new(100);
        let src = mixer.create_buffer_source(dc_buffer(1.0, 100), 1.0);
        mixer.start(src, 0.0, 0.0, 1.0).unwrap();
        assert!(matches!(
            mixer.start(src, 0.0, 0.0, 1.0),
            Err(GraphError::InvalidState(_))
        ));
    }

    #[test]
    fn test_invalid_timing_is_rejected() {
        let mut mixer = SoftwareMixer::new(100);
        let src = mixer.create_buffer_source(dc_buffer(1.0, 100), 1.0);
        assert!(matches!(
            mixer.start(src, 0.0, -1.0, 1.0),
            Err(GraphError::InvalidTiming { .. })
        ));
    }

    #[test]
    fn test_stop_silences_and_second_stop_errors() {
        let mut mixer = SoftwareMixer::new(100);
        let capture = mixer.create_capture();
        let src = mixer.create_buffer_source(dc_buffer(1.0, 100), 1.0);
        mixer.connect_to(src, capture).unwrap();
        mixer.start(src, 0.0, 0.0, 1.0).unwrap();
        mixer.render_until(0.2);
        mixer.stop(src).unwrap();
        assert_eq!(mixer.live_sources(), 0);
        assert!(mixer.stop(src).is_err());
        mixer.render_until(0.4);
        let samples = mixer.take_captured(capture);
        assert_eq!(samples[10 * MIXER_CHANNELS], 1.0);
        assert_eq!(samples[30 * MIXER_CHANNELS], 0.0);
    }

    #[test]
    fn test_feedback_delay_echoes() {
        let mut mixer = SoftwareMixer::new(100);
        let capture = mixer.create_capture();
        // 10 ms impulse.
        let impulse = Arc::new(AudioBuffer::new(100, 1, vec![1.0]));
        let src = mixer.create_buffer_source(impulse, 1.0);
        let delay = mixer.create_delay(0.2);
        let feedback = mixer.create_gain(0.5);
        let out = mixer.create_gain(1.0);
        mixer.connect(src, out).unwrap();
        mixer.connect(src, delay).unwrap();
        mixer.connect(delay, feedback).unwrap();
        mixer.connect(feedback, delay).unwrap();
        mixer.connect(delay, out).unwrap();
        mixer.connect_to(out, capture).unwrap();
        mixer.start(src, 0.0, 0.0, 0.01).unwrap();
        mixer.render_until(0.5);

        let samples = mixer.take_captured(capture);
        let frame = |i: usize| samples[i * MIXER_CHANNELS];
        assert_eq!(frame(0), 1.0);
        assert_eq!(frame(20), 1.0);
        assert_eq!(frame(40), 0.5);
        assert_eq!(frame(10), 0.0);
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut mixer = SoftwareMixer::new(48_000);
        let capture = mixer.create_capture();
        let alternating: Vec<f32> = (0..4800).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let src = mixer.create_buffer_source(Arc::new(AudioBuffer::new(48_000, 1, alternating)), 1.0);
        let filter = mixer.create_biquad(BiquadKind::Lowpass, 1200.0, 1.0);
        mixer.connect(src, filter).unwrap();
        mixer.connect_to(filter, capture).unwrap();
        mixer.start(src, 0.0, 0.0, 0.1).unwrap();
        mixer.render_until(0.1);
        let samples = mixer.take_captured(capture);
        let tail_peak = samples[4000..]
            .iter()
            .fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(tail_peak < 0.05, "peak {tail_peak}");
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        blocks: std::rc::Rc<std::cell::RefCell<Vec<Vec<f32>>>>,
    }

    impl SpeakerSink for RecordingSink {
        fn queue(&mut self, samples: Vec<f32>, sample_rate: u32, channels: u16) {
            assert_eq!((sample_rate, channels), (100, MIXER_CHANNELS as u16));
            self.blocks.borrow_mut().push(samples);
        }
    }

    #[test]
    fn test_speakers_receive_the_mix_per_render() {
        let sink = RecordingSink::default();
        let blocks = std::rc::Rc::clone(&sink.blocks);
        let mut mixer = SoftwareMixer::with_speakers(100, Box::new(sink));
        let capture = mixer.create_capture();
        let src = mixer.create_buffer_source(dc_buffer(1.0, 100), 1.0);
        let gain = mixer.create_gain(0.5);
        mixer.connect(src, gain).unwrap();
        mixer.connect_to(gain, Destination::Speakers).unwrap();
        mixer.start(src, 0.1, 0.0, 0.2).unwrap();

        mixer.render_until(0.2);
        mixer.render_until(0.5);
        mixer.render_until(0.5);

        let blocks = blocks.borrow();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 20 * MIXER_CHANNELS);
        assert_eq!(blocks[1].len(), 30 * MIXER_CHANNELS);
        let played: Vec<f32> = blocks.concat();
        assert_eq!(played[5 * MIXER_CHANNELS], 0.0);
        assert_eq!(played[15 * MIXER_CHANNELS], 0.5);
        assert_eq!(played[25 * MIXER_CHANNELS + 1], 0.5);
        assert_eq!(played[35 * MIXER_CHANNELS], 0.0);
        // Speaker routing does not leak into captures.
        assert!(mixer.take_captured(capture).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_detached_speakers_stop_rendering() {
        let mut mixer = SoftwareMixer::with_speakers(100, Box::new(RecordingSink::default()));
        assert!(mixer.has_speakers());
        assert!(mixer.detach_speakers().is_some());
        mixer.render_until(1.0);
        assert_eq!(mixer.current_time(), 1.0);
        assert!(!mixer.has_speakers());
    }

    #[test]
    fn test_disconnect_removes_edges() {
        let mut mixer = SoftwareMixer::new(100);
        let src = mixer.create_buffer_source(dc_buffer(1.0, 100), 1.0);
        let gain = mixer.create_gain(1.0);
        mixer.connect(src, gain).unwrap();
        mixer.disconnect(src);
        assert!(mixer.inputs_of(gain).is_empty());
        assert_eq!(mixer.node_count(), 1);
        mixer.disconnect(src);
    }
}
