use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved lifecycle event names.
///
/// On the root channel these are raw transport notifications, never
/// application events: listeners for them are invoked locally without
/// the request/response machinery, and an inbound dispatch without a
/// channel field whose event name is reserved is not routed as an
/// application event. Named channels are unaffected.
pub const RESERVED_EVENTS: [&str; 5] = ["open", "message", "error", "close", "disconnect"];

/// Returns true if `name` is a reserved lifecycle event name.
pub fn is_reserved_event(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

/// An exception-shaped error crossing the wire.
///
/// Serialized losslessly as a message plus its enumerable fields,
/// flattened into the envelope's `e` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Human-readable error message.
    pub message: String,
    /// Remaining enumerable fields of the original error.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Attach an enumerable field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// The error half of a response envelope.
///
/// The `_` wire flag distinguishes an exception-shaped error (to be
/// reconstructed as [`RemoteError`]) from an arbitrary rejection value
/// passed through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPayload {
    /// Exception-shaped: `e` is an object, `_` is set.
    Exception(RemoteError),
    /// Arbitrary rejection value, passed through verbatim.
    Value(Value),
}

impl From<RemoteError> for ErrorPayload {
    fn from(err: RemoteError) -> Self {
        ErrorPayload::Exception(err)
    }
}

/// One unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// An event with arguments, optionally expecting a response.
    Dispatch {
        /// Target channel; `None` addresses the root.
        channel: Option<String>,
        /// Event name (element 0 of the wire array).
        event: String,
        /// Event arguments (remaining elements of the wire array).
        args: Vec<Value>,
        /// Present when the sender expects a response.
        request_id: Option<u64>,
    },
    /// The answer to a previously sent request.
    Response {
        /// Id of the request being answered.
        request_id: u64,
        /// Success payload or error payload.
        result: std::result::Result<Value, ErrorPayload>,
    },
    /// A message intentionally not part of this protocol.
    Ignored,
}

impl Envelope {
    /// Build a fire-and-forget dispatch.
    pub fn event(channel: Option<String>, event: impl Into<String>, args: Vec<Value>) -> Self {
        Envelope::Dispatch {
            channel,
            event: event.into(),
            args,
            request_id: None,
        }
    }

    /// Build a dispatch that expects a response.
    pub fn request(
        channel: Option<String>,
        event: impl Into<String>,
        args: Vec<Value>,
        request_id: u64,
    ) -> Self {
        Envelope::Dispatch {
            channel,
            event: event.into(),
            args,
            request_id: Some(request_id),
        }
    }

    /// Build a success response.
    pub fn resolve(request_id: u64, data: Value) -> Self {
        Envelope::Response {
            request_id,
            result: Ok(data),
        }
    }

    /// Build a rejection response.
    pub fn reject(request_id: u64, error: impl Into<ErrorPayload>) -> Self {
        Envelope::Response {
            request_id,
            result: Err(error.into()),
        }
    }
}
