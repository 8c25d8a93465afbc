//! Error types for the wire grammar and line codec.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while framing or parsing server-to-server lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying transport failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The line was empty after stripping the terminator.
    #[error("empty message")]
    EmptyMessage,

    /// The line did not match the IRC grammar.
    #[error("invalid message at byte {position}: {string:?}")]
    InvalidMessage {
        /// The offending line.
        string: String,
        /// Byte offset where parsing stopped.
        position: usize,
    },

    /// A line (or unterminated partial line) exceeded the configured limit.
    #[error("line too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Observed length.
        actual: usize,
        /// Configured maximum.
        limit: usize,
    },
}
