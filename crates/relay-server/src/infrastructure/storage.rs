//! TOML settings file for the relay binary.
//!
//! Default location:
//! - Windows:  `%APPDATA%\MgmtRelay\relay.toml`
//! - Linux:    `~/.config/mgmt-relay/relay.toml`
//! - macOS:    `~/Library/Application Support/MgmtRelay/relay.toml`
//!
//! ```toml
//! log_level = "info"
//!
//! [relay]
//! enabled = true
//! port = 31416
//! encryption_enabled = false
//! shared_secret = "change-me"
//! allowed_addresses = ["192.168.10"]
//!
//! [listener]
//! bind_address = "0.0.0.0"
//! accept_delay_ms = 100
//!
//! [downstream]
//! address = "127.0.0.1:31416"
//! ```
//!
//! Every field is optional.  A missing file, section or field takes its
//! default, so the relay starts disabled on first run.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::protocol::DEFAULT_MAX_FRAME_BYTES;
use relay_core::RelayConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DownstreamEndpoint, InvalidEndpoint, ListenerOptions};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error(transparent)]
    InvalidDownstream(#[from] InvalidEndpoint),
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySettings {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub listener: ListenerSettings,
    #[serde(default)]
    pub downstream: DownstreamSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_accept_delay_ms")]
    pub accept_delay_ms: u64,
    #[serde(default = "default_accept_idle_timeout_secs")]
    pub accept_idle_timeout_secs: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_disabled_poll_secs")]
    pub disabled_poll_secs: u64,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownstreamSettings {
    /// `host:port`, or an absolute Unix socket path.
    #[serde(default = "default_downstream_address")]
    pub address: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_accept_delay_ms() -> u64 {
    100
}
fn default_accept_idle_timeout_secs() -> u64 {
    10
}
fn default_drain_timeout_secs() -> u64 {
    5
}
fn default_disabled_poll_secs() -> u64 {
    2
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_downstream_address() -> String {
    DownstreamEndpoint::default().to_string()
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            relay: RelayConfig::default(),
            listener: ListenerSettings::default(),
            downstream: DownstreamSettings::default(),
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            accept_delay_ms: default_accept_delay_ms(),
            accept_idle_timeout_secs: default_accept_idle_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            disabled_poll_secs: default_disabled_poll_secs(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for DownstreamSettings {
    fn default() -> Self {
        Self {
            address: default_downstream_address(),
        }
    }
}

impl RelaySettings {
    /// Converts the `[listener]` and `[downstream]` sections into
    /// supervisor options.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidBindAddress`] or
    /// [`SettingsError::InvalidDownstream`] when an address does not parse.
    pub fn listener_options(&self) -> Result<ListenerOptions, SettingsError> {
        let listener = &self.listener;
        let bind_address: IpAddr = listener
            .bind_address
            .trim()
            .parse()
            .map_err(|_| SettingsError::InvalidBindAddress(listener.bind_address.clone()))?;
        let downstream: DownstreamEndpoint = self.downstream.address.parse()?;

        Ok(ListenerOptions {
            bind_address,
            downstream,
            accept_delay: Duration::from_millis(listener.accept_delay_ms),
            accept_idle_timeout: Duration::from_secs(listener.accept_idle_timeout_secs.max(1)),
            drain_timeout: Duration::from_secs(listener.drain_timeout_secs),
            disabled_poll_interval: Duration::from_secs(listener.disabled_poll_secs.max(1)),
            max_frame_bytes: listener.max_frame_bytes,
        })
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

/// Path of the settings file in the platform config directory.
///
/// # Errors
///
/// Returns [`SettingsError::NoPlatformConfigDir`] if the base directory
/// cannot be determined from the environment.
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    platform_config_dir()
        .map(|dir| dir.join("relay.toml"))
        .ok_or(SettingsError::NoPlatformConfigDir)
}

/// Loads settings from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system errors other than "not
/// found", and [`SettingsError::Parse`] if the TOML is malformed.
pub fn load_settings(path: &Path) -> Result<RelaySettings, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelaySettings::default()),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `settings` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system failures or
/// [`SettingsError::Serialize`] if serialization fails.
pub fn save_settings(path: &Path, settings: &RelaySettings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MgmtRelay"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("mgmt-relay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MgmtRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
