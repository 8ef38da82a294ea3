//! Canonical message types for bridge communication.
//!
//! This module defines the message types used between the session runner,
//! the bridge, and the binary's supervision loop.

/// A message arriving from the linked relay channel, to be spoken in-game.
#[derive(Debug, Clone)]
pub struct RelayInbound {
    /// Relay-side author id (for dedupe and audit logs).
    pub author_id: u64,
    /// Display name the relay adapter resolved for the author.
    pub author_name: String,
    /// Relay-side message id, used for double-delivery suppression.
    pub message_id: u64,
    /// Message content.
    pub text: String,
}

/// Status changes published by a session runner.
///
/// Consumed by the binary for logging and administrator alerting.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// A connection attempt is starting.
    Connecting,
    /// The session reached Ready and chat is flowing.
    Ready,
    /// The connection dropped; a reconnect is scheduled.
    Disconnected { reason: String },
    /// Login was refused. Fatal once the bounded retry count is exhausted.
    AuthFailure { attempts: u32, fatal: bool },
}
