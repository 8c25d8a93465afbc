//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use std::net::IpAddr;
use std::path::Path;

use thiserror::Error;

use super::{Config, Protocol};
use crate::protocol::uid::{is_p10_server_numeric, is_ts6_sid};

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.name must contain a '.', got '{0}'")]
    InvalidServerName(String),
    #[error("at least one [[uplinks]] block is required")]
    NoUplinks,
    #[error("server.sid is required for {0} uplinks")]
    MissingSid(Protocol),
    #[error("server.sid must match pattern [0-9][A-Z0-9][A-Z0-9] for {protocol}, got '{sid}'")]
    InvalidSidFormat { protocol: Protocol, sid: String },
    #[error("server.sid must be a two-character P10 numeric, got '{0}'")]
    InvalidP10Numeric(String),
    #[error("uplink '{0}': max_modes must be at least 1")]
    InvalidMaxModes(String),
    #[error("uplink '{name}': bind must be an IP address, got '{value}'")]
    InvalidBind { name: String, value: String },
    #[error("uplink '{0}': client_cert and client_key must be set together")]
    IncompleteClientCert(String),
    #[error("uplink '{name}': file does not exist: {path}")]
    FileNotFound { name: String, path: String },
    #[error("status.nick is required when the status service is enabled")]
    MissingStatusNick,
    #[error("status.channel must start with '#' or '&', got '{0}'")]
    InvalidStatusChannel(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let name = &config.server.name;
    if name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    } else if !name.contains('.') {
        errors.push(ValidationError::InvalidServerName(name.clone()));
    }

    if config.uplinks.is_empty() {
        errors.push(ValidationError::NoUplinks);
    }

    // Each protocol in use constrains the shape of our id.
    let mut seen = Vec::new();
    for uplink in &config.uplinks {
        if !seen.contains(&uplink.protocol) {
            seen.push(uplink.protocol);
            check_sid(uplink.protocol, config.server.sid.as_deref(), &mut errors);
        }

        if uplink.max_modes == 0 {
            errors.push(ValidationError::InvalidMaxModes(uplink.name.clone()));
        }

        if let Some(bind) = &uplink.bind
            && bind.parse::<IpAddr>().is_err()
        {
            errors.push(ValidationError::InvalidBind {
                name: uplink.name.clone(),
                value: bind.clone(),
            });
        }

        match (&uplink.client_cert, &uplink.client_key) {
            (Some(cert), Some(key)) => {
                for path in [cert, key] {
                    if !Path::new(path).exists() {
                        errors.push(ValidationError::FileNotFound {
                            name: uplink.name.clone(),
                            path: path.display().to_string(),
                        });
                    }
                }
            }
            (None, None) => {}
            _ => errors.push(ValidationError::IncompleteClientCert(uplink.name.clone())),
        }
    }

    if config.status.enabled {
        if config.status.nick.is_empty() {
            errors.push(ValidationError::MissingStatusNick);
        }
        if !config.status.channel.starts_with(['#', '&']) {
            errors.push(ValidationError::InvalidStatusChannel(
                config.status.channel.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_sid(protocol: Protocol, sid: Option<&str>, errors: &mut Vec<ValidationError>) {
    match (protocol, sid) {
        (Protocol::Unreal, _) => {}
        (_, None) => errors.push(ValidationError::MissingSid(protocol)),
        (Protocol::P10, Some(sid)) => {
            if !is_p10_server_numeric(sid) {
                errors.push(ValidationError::InvalidP10Numeric(sid.to_string()));
            }
        }
        (Protocol::Ts6 | Protocol::Inspircd, Some(sid)) => {
            if !is_ts6_sid(sid) {
                errors.push(ValidationError::InvalidSidFormat {
                    protocol,
                    sid: sid.to_string(),
                });
            }
        }
    }
}
