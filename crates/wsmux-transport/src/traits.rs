use crate::error::Result;

/// Connection readiness reported by a transport.
///
/// Mirrors the ready states of a WebSocket-like channel. Sessions never
/// cache this; they ask the transport every time so the answer cannot
/// drift out of sync with the real connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The connection attempt is still in progress.
    Connecting,
    /// The connection is established; `send` is valid.
    Open,
    /// A close has been initiated but not yet completed.
    Closing,
    /// The connection is closed.
    Closed,
}

/// A discrete event delivered by a transport.
///
/// Transports queue these internally; the session drains them through
/// [`Transport::poll_event`] on its cooperative scheduler. No event is
/// delivered while another callback is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection transitioned to open.
    Open,
    /// A complete text message arrived.
    Message(String),
    /// The underlying channel reported an error.
    Error(String),
    /// The connection closed.
    Closed,
}

/// The contract wsmux requires from a concrete connection.
///
/// Implementations wrap a browser-native or server-side socket and
/// translate its open/message/error/close callbacks into queued
/// [`TransportEvent`]s. Delivery guarantees (ordering, framing) are the
/// transport's responsibility; wsmux only assumes that `send` transmits
/// one complete text message while the transport reports itself open.
pub trait Transport {
    /// Current readiness of the connection.
    fn readiness(&self) -> Readiness;

    /// Transmit one text message. Valid only while open.
    fn send(&mut self, data: &str) -> Result<()>;

    /// Initiate connection close.
    fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<()>;

    /// Pop the next pending event, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}
