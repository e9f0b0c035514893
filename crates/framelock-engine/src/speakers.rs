//! The live output device behind [`Destination::Speakers`].
//!
//! [`Destination::Speakers`]: crate::graph::Destination::Speakers

use std::fmt;

use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::info;

use crate::error::{EngineError, Result};

/// Receives the speaker mix as the software mixer renders it.
pub trait SpeakerSink: fmt::Debug {
    /// Queue interleaved `f32` PCM behind whatever is already playing.
    fn queue(&mut self, samples: Vec<f32>, sample_rate: u32, channels: u16);
}

/// The default system output, through rodio.
pub struct RodioSpeakers {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
    queued_samples: u64,
}

impl RodioSpeakers {
    pub fn open() -> Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| EngineError::AudioOutput(e.to_string()))?;
        let sink =
            Sink::try_new(&stream_handle).map_err(|e| EngineError::AudioOutput(e.to_string()))?;
        info!("opened default audio output");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
            queued_samples: 0,
        })
    }

    /// Total samples handed to the device so far.
    pub fn queued_samples(&self) -> u64 {
        self.queued_samples
    }
}

impl fmt::Debug for RodioSpeakers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RodioSpeakers")
            .field("queued_samples", &self.queued_samples)
            .finish_non_exhaustive()
    }
}

impl SpeakerSink for RodioSpeakers {
    fn queue(&mut self, samples: Vec<f32>, sample_rate: u32, channels: u16) {
        if samples.is_empty() {
            return;
        }
        self.queued_samples += samples.len() as u64;
        let source = rodio::buffer::SamplesBuffer::new(channels, sample_rate, samples);
        self.sink.append(source);
    }
}
