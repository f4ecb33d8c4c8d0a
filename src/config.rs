//! Session configuration, loaded from `settings.json` in the user cache dir.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tui::MouseMode;

const CONFIG_DIR: &str = "ttyclutch";
const CONFIG_FILE: &str = "settings.json";

pub const DEFAULT_READ_BUFFER: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Terminal type override; `$TERM` is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub mouse: MouseMode,
    pub bracketed_paste: bool,
    /// Upper bound on waiting for the loops during disengage. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_ms: Option<u64>,
    pub read_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            term: None,
            mouse: MouseMode::Off,
            bracketed_paste: false,
            shutdown_timeout_ms: None,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl SessionConfig {
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_buffer(&self) -> usize {
        self.read_buffer.max(1)
    }
}

pub fn config_path() -> Option<PathBuf> {
    get_cache_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

pub fn load_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Loads the config from [`config_path`], writing the defaults there first
/// if the file does not exist yet. `None` if it cannot be read or is invalid.
pub fn load_settings() -> Option<SessionConfig> {
    let path = config_path()?;
    match load_or_init(&path) {
        Ok(config) => Some(config),
        Err(ConfigError::Io(err)) => {
            tracing::debug!(path = %path.display(), error = %err, "settings unavailable");
            None
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring invalid config");
            None
        }
    }
}

pub fn ensure_config_file(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    if !path.exists() {
        let content = serde_json::to_string_pretty(&SessionConfig::default())?;
        std::fs::write(path, content)?;
    }
    Ok(())
}

/// Writes the default settings file if it is missing, then loads it.
pub fn load_or_init(path: &Path) -> Result<SessionConfig, ConfigError> {
    ensure_config_file(path)?;
    load_config(path)
}

pub fn log_dir() -> Option<PathBuf> {
    get_cache_dir().map(|dir| dir.join(CONFIG_DIR).join("logs"))
}

pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cannot determine log directory",
        )
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

pub fn get_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Caches"));
    }

    #[cfg(not(target_os = "macos"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            return Some(PathBuf::from(xdg));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".cache"))
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
