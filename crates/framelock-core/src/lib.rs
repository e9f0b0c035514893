pub mod clip;
pub mod commands;
pub mod error;
pub mod geometry;
pub mod gesture;
pub mod media;
pub mod time;
pub mod timeline;
