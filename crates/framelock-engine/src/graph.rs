//! The audio graph the scheduler drives.
//!
//! Modelled on a node graph with its own device clock: buffer sources are
//! started at a device time, routed through gain/filter/delay nodes and
//! into a destination. Parameter automation is expressed in device time.

use std::sync::Arc;

use crate::error::GraphError;
use crate::media::AudioBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Where a node's output ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The live output device.
    Speakers,
    /// A capture sink whose samples can be drained for encoding.
    Capture(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
}

pub trait AudioGraph {
    /// Device clock in seconds.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// A one-shot source over `buffer` at the given playback rate.
    fn create_buffer_source(&mut self, buffer: Arc<AudioBuffer>, playback_rate: f64) -> NodeId;

    fn create_gain(&mut self, value: f64) -> NodeId;

    fn create_biquad(&mut self, kind: BiquadKind, frequency: f64, q: f64) -> NodeId;

    fn create_delay(&mut self, delay: f64) -> NodeId;

    /// Jump a gain node to `value` at device time `time`.
    fn set_gain_at(&mut self, node: NodeId, value: f64, time: f64) -> Result<(), GraphError>;

    /// Ramp a gain node linearly to `value`, arriving at device time `time`.
    fn ramp_gain_to(&mut self, node: NodeId, value: f64, time: f64) -> Result<(), GraphError>;

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError>;

    fn connect_to(&mut self, from: NodeId, destination: Destination) -> Result<(), GraphError>;

    /// Remove a node and every connection touching it. Unknown ids are ignored.
    fn disconnect(&mut self, node: NodeId);

    /// Start a source at device time `when`, reading from `offset` source
    /// seconds for `duration` source seconds. A source starts once.
    fn start(
        &mut self,
        source: NodeId,
        when: f64,
        offset: f64,
        duration: f64,
    ) -> Result<(), GraphError>;

    /// Stop a source immediately. Stopping twice is an error.
    fn stop(&mut self, source: NodeId) -> Result<(), GraphError>;

    /// Open a new capture sink.
    fn create_capture(&mut self) -> Destination;

    /// Interleaved samples written to a capture since the last call.
    fn take_captured(&mut self, destination: Destination) -> Vec<f32>;

    fn close_capture(&mut self, destination: Destination);

    /// Advance the device clock to `time`, rendering whatever is needed.
    /// Hardware-backed graphs run on their own and ignore this.
    fn render_until(&mut self, _time: f64) {}
}
