//! File logging. The terminal is owned by the alternate screen, so tracing
//! output goes to the configured log file only.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, expand_home};

/// Installs the global subscriber. Returns the log path when logging is active.
pub fn init(config: &LoggingConfig) -> Option<PathBuf> {
    let raw = config.file.trim();
    if raw.is_empty() {
        return None;
    }
    let path = expand_home(raw).ok()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .ok()?;
    Some(path)
}
