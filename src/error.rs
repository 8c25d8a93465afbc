//! Error types for the link daemon.
//!
//! Two families: [`UplinkError`] ends the current connection and sends the
//! uplink loop back to reconnecting; [`ActionError`] is returned to a service
//! that asked for something malformed and never touches the link.

use slsvc_proto::ProtocolError;
use thiserror::Error;

// ============================================================================
// Uplink Errors (fatal to the connection)
// ============================================================================

/// Conditions that tear the uplink down.
#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("connection closed by uplink")]
    Closed,

    #[error("password mismatch from uplink")]
    BadPassword,

    #[error("uplink announced itself as '{actual}', expected '{expected}'")]
    ServerNameMismatch { expected: String, actual: String },

    #[error("clock skew of {0}s with uplink")]
    ClockSkew(i64),

    #[error("uplink sent ERROR: {0}")]
    Remote(String),

    #[error("uplink squit us: {0}")]
    Squit(String),

    #[error("malformed handshake: {0}")]
    Handshake(String),
}

impl UplinkError {
    /// Static code for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
            Self::Tls(_) => "tls",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::Closed => "closed",
            Self::BadPassword => "bad_password",
            Self::ServerNameMismatch { .. } => "server_name_mismatch",
            Self::ClockSkew(_) => "clock_skew",
            Self::Remote(_) => "remote_error",
            Self::Squit(_) => "squit",
            Self::Handshake(_) => "handshake",
        }
    }
}

// ============================================================================
// Action Errors (bad service requests)
// ============================================================================

/// A service action was refused before anything went on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("not linked to an uplink")]
    NotConnected,

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("user {0} is not one of ours")]
    NotLocal(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("invalid nickname: {0}")]
    InvalidNick(String),

    #[error("nickname in use: {0}")]
    NickInUse(String),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("no text to send")]
    NoText,

    #[error("text contains a line break")]
    LineBreak,

    #[error("{user} is not on {channel}")]
    NotOnChannel { user: String, channel: String },

    #[error("UID space exhausted")]
    UidsExhausted,
}

/// Result alias for service actions.
pub type ActionResult<T = ()> = Result<T, ActionError>;
