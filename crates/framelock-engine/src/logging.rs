//! Tracing subscriber setup.
//!
//! A bare level in the config applies to the framelock crates only; the
//! audio backend and everything else stays at `warn`. `RUST_LOG` overrides
//! the config entirely.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Crates whose events follow the configured level.
const ENGINE_TARGETS: [&str; 2] = ["framelock_core", "framelock_engine"];

/// Level for everything outside [`ENGINE_TARGETS`].
const DEPENDENCY_LEVEL: &str = "warn";

/// Expand a bare level like `debug` into per-target directives. Anything
/// that already names targets or lists several directives is kept as is.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        return filter_directives(&LoggingConfig::default().level);
    }
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut directives: Vec<String> = ENGINE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    directives.push(DEPENDENCY_LEVEL.to_string());
    directives.join(",")
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(filter_directives(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(filter_directives("")))
}

/// Install the global subscriber, writing to stderr. Returns false if one
/// was already installed, in which case this call changes nothing.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_writer(std::io::stderr)
        .with_target(true);
    let installed = if config.json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.compact().without_time().try_init()
    };
    installed.is_ok()
}

/// Logging with default settings, for tests and small tools.
pub fn init_default_logging() -> bool {
    init_logging(&LoggingConfig::default())
}
