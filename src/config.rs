use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const CONFIG_DIR: &str = ".attempt-tui";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_CONFIG_TOML: &str = r#"[server]
base_url = "http://127.0.0.1:5000"
timeout_secs = 10
session_cookie = ""
user_agent = "attempt-tui"

[exam]
duration_secs = 14100

[autosave]
overlap = "drop"

[logging]
file = "~/.attempt-tui/attempt-tui.log"
filter = "info"
"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("HOME is not set")]
    HomeNotSet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub exam: ExamConfig,
    pub autosave: AutosaveConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Value of the server's `session` cookie for an authenticated user.
    pub session_cookie: String,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 10,
            session_cookie: String::new(),
            user_agent: "attempt-tui".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExamConfig {
    pub duration_secs: u64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            duration_secs: 235 * 60,
        }
    }
}

/// What to do with a save requested while another one is still outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveOverlapPolicy {
    #[default]
    Drop,
    /// Keep only the newest value and send it once the outstanding save completes.
    Coalesce,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub overlap: SaveOverlapPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Empty disables logging.
    pub file: String,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: "~/.attempt-tui/attempt-tui.log".to_string(),
            filter: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads `path`, or `~/.attempt-tui/config.toml` when none is given. The
    /// default file is written on first use.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_file = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let config_dir = config_dir()?;
                fs::create_dir_all(&config_dir)?;
                let config_file = config_dir.join(CONFIG_FILE);
                if !config_file.exists() {
                    fs::write(&config_file, DEFAULT_CONFIG_TOML)?;
                }
                config_file
            }
        };
        let text = fs::read_to_string(config_file)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Self>(text)?)
    }
}

pub fn expand_home(raw_path: &str) -> Result<PathBuf, ConfigError> {
    if raw_path == "~" {
        return home_dir();
    }
    if let Some(rest) = raw_path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(raw_path))
}

/// `~/.attempt-tui`, home of the config, theme and default log files.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(CONFIG_DIR))
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or(ConfigError::HomeNotSet)
}
