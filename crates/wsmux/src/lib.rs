//! Channel-multiplexed messaging sessions over WebSocket-like transports.
//!
//! wsmux layers named channels, request/response correlation, and
//! disconnect-tolerant send queueing on top of any text transport that
//! can report open/message/error/close events.
//!
//! # Crate Structure
//!
//! - [`transport`] — The transport contract and an in-memory pair for tests
//! - [`wire`] — JSON envelope encoding, decoding, and classification
//! - [`session`] — Sessions, channels, requests, and middleware

/// Re-export transport types.
pub mod transport {
    pub use wsmux_transport::*;
}

/// Re-export wire codec types.
pub mod wire {
    pub use wsmux_wire::*;
}

/// Re-export session types.
pub mod session {
    pub use wsmux_session::*;
}

pub use wsmux_session::{Channel, Reply, Session, SessionConfig};
pub use wsmux_transport::{PairTransport, Transport};
