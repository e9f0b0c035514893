//! Engine configuration.
//!
//! Every field has a default, so a partial JSON file only overrides what it
//! names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas: CanvasConfig,
    pub sync: SyncConfig,
    pub audio: AudioConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Preview canvas size in pixels. Export frames use the same size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

/// Video element drift tolerances in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// While playing, elements run freely and are only corrected past this.
    pub playing_tolerance: f64,
    /// While paused, scrubbing or exporting.
    pub exact_tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub lowpass_hz: f64,
    pub highpass_hz: f64,
    pub filter_q: f64,
    pub echo_delay: f64,
    pub echo_feedback: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Candidate container/codec profiles, most preferred first.
    pub profiles: Vec<String>,
    pub capture_fps: u32,
    pub video_bits_per_second: u64,
    /// How often the end-of-window watcher runs, in seconds.
    pub poll_interval: f64,
    pub file_stem: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "framelock_engine=debug,warn".
    pub level: String,
    pub json: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            playing_tolerance: 0.25,
            exact_tolerance: 0.05,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            lowpass_hz: 1200.0,
            highpass_hz: 500.0,
            filter_q: 1.0,
            echo_delay: 0.2,
            echo_feedback: 0.35,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            profiles: vec![
                "video/mp4".to_string(),
                "video/webm;codecs=h264".to_string(),
                "video/webm;codecs=vp9".to_string(),
                "video/webm".to_string(),
            ],
            capture_fps: 30,
            video_bits_per_second: 8_000_000,
            poll_interval: 0.1,
            file_stem: "my_movie".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults if it is missing or invalid.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, e);
            }
        }
        Self::default()
    }

    /// Load from the standard per-user location.
    pub fn load_default_location() -> Self {
        Self::load(&config_file_path())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/framelock/config.json`, or under `~/.config`.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framelock").join("config.json")
}
