//! Wire envelope types and text codec for the wsmux protocol.
//!
//! This is the codec layer of wsmux. Every protocol message is one JSON
//! object serialized as text:
//! - `a` — event name plus arguments (dispatch)
//! - `c` — channel name (dispatch, omitted for the root channel)
//! - `i` — request id (dispatch expecting a response, or any response)
//! - `d` / `e` / `_` — response success payload, error payload, and the
//!   exception-shaped marker
//! - `"ws-wrapper": false` — sentinel for traffic that coexists on the
//!   socket but is not part of this protocol
//!
//! Malformed or foreign payloads decode to errors or the ignore
//! sentinel; the session layer drops both silently.

pub mod codec;
pub mod envelope;
pub mod error;

pub use codec::{decode, encode};
pub use envelope::{is_reserved_event, Envelope, ErrorPayload, RemoteError, RESERVED_EVENTS};
pub use error::{CodecError, Result};
