use thiserror::Error;

use framelock_core::error::CoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("no supported export profile among: {candidates}")]
    NoSupportedProfile { candidates: String },

    #[error("an export is already rendering")]
    ExportInProgress,

    #[error("no export is rendering")]
    NotExporting,

    #[error("export did not reach the project end after {ticks} ticks")]
    ExportStalled { ticks: u64 },

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("audio graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("audio output error: {0}")]
    AudioOutput(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure reported by the platform audio graph for a single operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("unknown audio node {0}")]
    UnknownNode(u64),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid timing: when={when} offset={offset} duration={duration}")]
    InvalidTiming { when: f64, offset: f64, duration: f64 },
}

/// A single media item that could not be imported.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImportError {
    #[error("failed to load {name}: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("unsupported media type: {0}")]
    Unsupported(String),
}
