//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Protocol-related errors (wire format).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid packet: {message}")]
    InvalidPacket { message: String },

    #[error("Packet too short: need {needed} bytes, got {got}")]
    PacketTooShort { needed: usize, got: usize },

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid string encoding: {message}")]
    InvalidString { message: String },

    #[error("Malformed VarInt")]
    MalformedVarInt,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors.
///
/// Everything here except `AuthFailed` is transient: the session runner
/// retries it with backoff. `AuthFailed` is fatal after a bounded retry
/// count and escalates to an administrator alert.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether the session runner should keep retrying after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ConnectionError::AuthFailed { .. })
    }
}

/// Errors surfaced to moderation-command callers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The awaited response never arrived; carries the original command.
    #[error("No response to '{command}' before the deadline")]
    Timeout { command: String },

    /// The caller cancelled the command. Not a failure of the command itself.
    #[error("Command was cancelled")]
    Aborted,

    /// The server answered with a recognized error string, surfaced verbatim.
    #[error("Command rejected: {matched}")]
    Rejected { matched: String },

    /// The session dropped while the command was pending.
    #[error("Session disconnected while the command was pending")]
    Disconnected,
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Result type alias for command execution.
pub type CommandResult<T> = std::result::Result<T, CommandError>;
