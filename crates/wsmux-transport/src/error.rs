use crate::traits::Readiness;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `send` was called while the transport was not open.
    #[error("transport is not open (readiness: {0:?})")]
    NotOpen(Readiness),

    /// The underlying channel failed to transmit a message.
    #[error("transport send failed: {0}")]
    Send(String),

    /// An I/O error occurred on the underlying channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
