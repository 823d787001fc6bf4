// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Panel configuration — persisted to /etc/dapx/panel.toml
//!
//! Every field has a default so a missing file, or a file that only sets
//! `api_url`, is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/dapx/panel.toml";

/// Which node of the inventory answers consolidated cluster queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinatorPolicy {
    /// First node in the inventory, whatever its state.
    #[default]
    First,
    /// First node reported online, falling back to the first node.
    FirstOnline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Base URL of the management API, including the `/api` prefix
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Durable session file (credential + cached user profile)
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Cluster snapshot is reused without a request while younger than this
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub coordinator: CoordinatorPolicy,

    /// Route published on the navigation bus when the session expires
    #[serde(default = "default_login_route")]
    pub login_route: String,

    /// Management servers commonly run with self-signed certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_api_url() -> String { "http://127.0.0.1:8000/api".to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_stale_after() -> u64 { 60 }
fn default_refresh_interval() -> u64 { 30 }
fn default_login_route() -> String { "/login".to_string() }

fn default_state_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".dapx").join("session.json"),
        None => PathBuf::from(".dapx").join("session.json"),
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            state_file: default_state_file(),
            request_timeout_secs: default_request_timeout(),
            stale_after_secs: default_stale_after(),
            refresh_interval_secs: default_refresh_interval(),
            coordinator: CoordinatorPolicy::default(),
            login_route: default_login_route(),
            accept_invalid_certs: false,
        }
    }
}

impl PanelConfig {
    /// Load config from disk, or return defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Io { path: path.display().to_string(), source: e });
            }
        };
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.display().to_string(), source };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(io_err)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}
