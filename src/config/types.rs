//! Core configuration types and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use slsvc_proto::CaseMapping;
use thiserror::Error;

use super::defaults::*;
use super::links::UplinkBlock;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Our identity on the network.
    pub server: ServerConfig,
    /// Network-wide settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Uplinks, tried in priority order.
    #[serde(default)]
    pub uplinks: Vec<UplinkBlock>,
    /// Reconnect and I/O tuning.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Built-in status service.
    #[serde(default)]
    pub status: StatusConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Uplinks sorted by ascending priority, keeping file order for ties.
    pub fn uplinks_by_priority(&self) -> Vec<UplinkBlock> {
        let mut uplinks = self.uplinks.clone();
        uplinks.sort_by_key(|u| u.priority);
        uplinks
    }
}

/// Our server identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "services.straylight.net").
    pub name: String,
    /// Server description.
    #[serde(default = "default_description")]
    pub description: String,
    /// Protocol id: a TS6/InspIRCd SID or a P10 numeric. Unused on Unreal.
    #[serde(default)]
    pub sid: Option<String>,
    /// Where to write our pid, if anywhere.
    #[serde(default)]
    pub pidfile: Option<PathBuf>,
}

/// Network-wide settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    /// Casemapping used for nick and channel keys.
    #[serde(default)]
    pub casemapping: CaseMapping,
}

/// Reconnect and I/O tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Fixed delay between connection attempts.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Upper bound on how long the loop sleeps without timers due.
    #[serde(default = "default_timer_ceiling")]
    pub timer_ceiling_ms: u64,
    /// Give up on a TCP/TLS connect after this long.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Longest line accepted from the uplink.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn timer_ceiling(&self) -> Duration {
        Duration::from_millis(self.timer_ceiling_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            timer_ceiling_ms: default_timer_ceiling(),
            connect_timeout_secs: default_connect_timeout(),
            max_line_len: default_max_line_len(),
        }
    }
}

/// The `status` pseudo-user.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_status_nick")]
    pub nick: String,
    #[serde(default = "default_status_user")]
    pub user: String,
    #[serde(default = "default_status_host")]
    pub host: String,
    #[serde(default = "default_status_realname")]
    pub realname: String,
    /// Channel joined once the burst is over.
    #[serde(default = "default_status_channel")]
    pub channel: String,
    /// Post network counts to the channel this often. 0 disables.
    #[serde(default)]
    pub report_interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nick: default_status_nick(),
            user: default_status_user(),
            host: default_status_host(),
            realname: default_status_realname(),
            channel: default_status_channel(),
            report_interval_secs: 0,
        }
    }
}
