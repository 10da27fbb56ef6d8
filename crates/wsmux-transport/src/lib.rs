//! Transport adapter contract for wsmux sessions.
//!
//! A [`Transport`] is any message-oriented, full-duplex text channel:
//! a browser WebSocket, a server-side socket library, or the in-memory
//! [`PairTransport`] shipped here for tests and examples.
//!
//! This is the lowest layer of wsmux. Everything else builds on top of
//! the [`Transport`] trait provided here.

pub mod error;
pub mod pair;
pub mod traits;

pub use error::{Result, TransportError};
pub use pair::PairTransport;
pub use traits::{Readiness, Transport, TransportEvent};
