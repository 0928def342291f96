//! TOML-based configuration for the control socket.
//!
//! Reads `AppConfig` from an explicit path (`--config`) or from the
//! platform-appropriate config file:
//! - Linux:    `~/.config/emuctl/config.toml`
//! - macOS:    `~/Library/Application Support/emuctl/config.toml`
//!
//! Example:
//!
//! ```toml
//! [control]
//! socket_path = "/run/user/1000/emuctl.sock"
//! max_clients = 8
//! poll_interval_ms = 50
//!
//! [devices]
//! cdrom = 2
//!
//! [logging]
//! log_level = "debug"
//! ```
//!
//! # Serde default values
//!
//! Every field is annotated with `#[serde(default = "some_fn")]`, so a file
//! only needs the settings it wants to change.  A missing file is the same
//! as an empty one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use emuctl_core::{DeviceLayout, DEFAULT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch::{DispatchConfig, DEFAULT_MAX_PATH_LEN, DEFAULT_MONITORS};
use crate::infrastructure::socket::registry::DEFAULT_MAX_CLIENTS;
use crate::infrastructure::socket::ServerSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed fine but cannot work.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub devices: DeviceLayout,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    /// Filesystem path of the Unix-domain socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Connections beyond this are answered `ERR too many clients` and closed.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Per-client receive buffer in bytes; longer lines drop the client.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Upper bound on one wait of the event loop.
    #[serde(default = "default_select_timeout_ms")]
    pub select_timeout_ms: u64,
    /// Interval between two device-state samples.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Drop a client whose write does not finish in time. `0` waits forever.
    #[serde(default)]
    pub write_timeout_ms: u64,
    /// Image paths must be shorter than this many bytes.
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
    /// Number of addressable monitors for `screenshot` / `screencrc`.
    #[serde(default = "default_monitors")]
    pub monitors: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"emuctl_server=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

/// `$XDG_RUNTIME_DIR/emuctl.sock`, falling back to the temp directory.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("emuctl.sock")
}
fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}
fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_select_timeout_ms() -> u64 {
    200
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_max_path_len() -> usize {
    DEFAULT_MAX_PATH_LEN
}
fn default_monitors() -> usize {
    DEFAULT_MONITORS
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_clients: default_max_clients(),
            buffer_size: default_buffer_size(),
            select_timeout_ms: default_select_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            write_timeout_ms: 0,
            max_path_len: default_max_path_len(),
            monitors: default_monitors(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Rejects values that would make the server unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let control = &self.control;
        if control.max_clients == 0 {
            return Err(invalid("control.max_clients", "must be at least 1"));
        }
        if control.buffer_size < 2 {
            return Err(invalid("control.buffer_size", "must be at least 2 bytes"));
        }
        if control.select_timeout_ms == 0 {
            return Err(invalid("control.select_timeout_ms", "must be positive"));
        }
        if control.poll_interval_ms == 0 {
            return Err(invalid("control.poll_interval_ms", "must be positive"));
        }
        if control.max_path_len == 0 {
            return Err(invalid("control.max_path_len", "must be positive"));
        }
        if control.socket_path.as_os_str().is_empty() {
            return Err(invalid("control.socket_path", "must not be empty"));
        }
        Ok(())
    }

    /// Converts the file representation into runtime server settings.
    pub fn server_settings(&self) -> ServerSettings {
        let control = &self.control;
        ServerSettings {
            socket_path: control.socket_path.clone(),
            max_clients: control.max_clients,
            buffer_size: control.buffer_size,
            select_timeout: Duration::from_millis(control.select_timeout_ms),
            poll_interval: Duration::from_millis(control.poll_interval_ms),
            write_timeout: (control.write_timeout_ms > 0)
                .then(|| Duration::from_millis(control.write_timeout_ms)),
            dispatch: DispatchConfig {
                devices: self.devices.clone(),
                monitors: control.monitors,
                max_path_len: control.max_path_len,
            },
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the default location, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value fails validation.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`; a missing file yields the defaults.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    config.validate()?;
    Ok(config)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `emuctl`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("emuctl")
        })
    }

    #[cfg(not(target_os = "macos"))]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("emuctl"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
