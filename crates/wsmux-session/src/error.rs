use std::time::Duration;

use serde_json::Value;
use wsmux_wire::RemoteError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport is disconnected and the send queue is at its bound.
    #[error("transport is not connected and the send queue is full ({len} queued, max {max})")]
    QueueFull { len: usize, max: usize },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wsmux_transport::TransportError),

    /// Envelope encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] wsmux_wire::CodecError),

    /// The owning session was dropped while a channel handle was held.
    #[error("session has been dropped")]
    SessionGone,
}

/// How a request failed to produce a success payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// The request was cancelled by an explicit `abort()`.
    #[error("request was aborted")]
    Aborted,

    /// No response arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The peer rejected with an exception-shaped error.
    #[error("request rejected by peer: {0}")]
    Rejected(RemoteError),

    /// The peer rejected with an arbitrary value.
    #[error("request rejected by peer with a non-error value")]
    RejectedValue(Value),
}

pub type Result<T> = std::result::Result<T, SessionError>;
