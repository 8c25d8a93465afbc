//! Uplink configuration.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use super::defaults::{default_max_modes, default_priority, default_true};

/// Wire dialect spoken on an uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// charybdis / ratbox TS6.
    Ts6,
    /// ircu P10.
    P10,
    /// InspIRCd 1202 spanning tree.
    Inspircd,
    /// UnrealIRCd 3.2.
    Unreal,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ts6 => "ts6",
            Self::P10 => "p10",
            Self::Inspircd => "inspircd",
            Self::Unreal => "unreal",
        })
    }
}

/// One `[[uplinks]]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct UplinkBlock {
    /// Expected name of the remote server (e.g., "hub.straylight.net").
    pub name: String,
    /// Remote IP/hostname to connect to.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Local address to bind before connecting.
    #[serde(default)]
    pub bind: Option<String>,
    /// Whether to use TLS for this link.
    #[serde(default)]
    pub tls: bool,
    /// Whether to verify the remote certificate (only applies when tls = true).
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    /// Certificate fingerprint for pinning (SHA-256, hex, colons optional).
    #[serde(default)]
    pub cert_fingerprint: Option<String>,
    /// Client certificate presented to the uplink (PEM).
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    /// Private key for `client_cert` (PEM).
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Password we send.
    pub send_password: String,
    /// Password we expect back.
    pub receive_password: String,
    /// Dialect spoken on this link.
    pub protocol: Protocol,
    /// Maximum number of mode changes per outgoing MODE line.
    #[serde(default = "default_max_modes")]
    pub max_modes: usize,
    /// Lower values are tried first.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

impl UplinkBlock {
    /// `host:port`, for logging and connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
