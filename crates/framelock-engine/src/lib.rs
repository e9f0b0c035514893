pub mod automation;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod frame;
pub mod graph;
pub mod loader;
pub mod logging;
pub mod media;
pub mod mixer;
pub mod scheduler;
pub mod session;
pub mod speakers;
pub mod video_sync;
