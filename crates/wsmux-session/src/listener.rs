use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;
use wsmux_wire::{ErrorPayload, RemoteError};

use crate::session::{self, Inner};

/// Opaque identifier returned by `on`/`once`, accepted by `off`.
///
/// Replaces identity-based listener tracking: callers keep the handle
/// instead of the closure itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// One inbound event as seen by listeners and handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name.
    pub name: String,
    /// Event arguments.
    pub args: Vec<Value>,
}

impl Event {
    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

/// What a handler's return value does to the eventual response.
///
/// Only meaningful for request-shaped dispatches; for one-way events
/// the reply is discarded.
pub enum HandlerReply {
    /// Send this value back immediately as the success payload.
    Value(Value),
    /// Settle the response later, when the deferred reply completes.
    Deferred(Deferred),
}

impl HandlerReply {
    /// A reply carrying no payload (`null` on the wire).
    pub fn none() -> Self {
        HandlerReply::Value(Value::Null)
    }
}

impl From<Value> for HandlerReply {
    fn from(value: Value) -> Self {
        HandlerReply::Value(value)
    }
}

/// Result of one handler invocation. An `Err` rejects the request with
/// an exception-shaped error.
pub type HandlerResult = std::result::Result<HandlerReply, RemoteError>;

pub(crate) type Handler = Rc<RefCell<dyn FnMut(&Event) -> HandlerResult>>;

pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    pub(crate) once: bool,
    pub(crate) handler: Handler,
}

/// Where a deferred reply's settlement is delivered: the request id it
/// answers, sent through the (weakly held) owning session.
pub(crate) struct ResponseSink {
    pub(crate) session: Weak<RefCell<Inner>>,
    pub(crate) request_id: u64,
}

impl ResponseSink {
    fn deliver(&self, result: std::result::Result<Value, RemoteError>) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };
        match result {
            Ok(value) => session::send_resolve(&inner, self.request_id, value),
            Err(error) => {
                session::send_reject(&inner, self.request_id, ErrorPayload::Exception(error));
            }
        }
    }
}

struct DeferredState {
    outcome: Option<std::result::Result<Value, RemoteError>>,
    sink: Option<ResponseSink>,
    sent: bool,
}

impl DeferredState {
    fn try_deliver(&mut self) {
        if self.sent {
            return;
        }
        if let (Some(outcome), Some(sink)) = (&self.outcome, &self.sink) {
            self.sent = true;
            sink.deliver(outcome.clone());
        }
    }
}

/// The handler-side half of a deferred reply, returned inside
/// [`HandlerReply::Deferred`].
pub struct Deferred {
    state: Rc<RefCell<DeferredState>>,
}

/// The application-side half: settle it whenever the real answer is
/// ready. If the originating dispatch was one-way, settlement is a
/// no-op.
#[derive(Clone)]
pub struct DeferredHandle {
    state: Rc<RefCell<DeferredState>>,
}

impl Deferred {
    /// Create a linked deferred/handle pair.
    pub fn pair() -> (Deferred, DeferredHandle) {
        let state = Rc::new(RefCell::new(DeferredState {
            outcome: None,
            sink: None,
            sent: false,
        }));
        (
            Deferred {
                state: Rc::clone(&state),
            },
            DeferredHandle { state },
        )
    }

    /// Attach the response destination. Delivers immediately when the
    /// handle settled before the handler returned.
    pub(crate) fn bind_sink(&self, sink: ResponseSink) {
        let mut state = self.state.borrow_mut();
        state.sink = Some(sink);
        state.try_deliver();
    }
}

impl DeferredHandle {
    /// Fulfil the response with a success payload.
    pub fn resolve(&self, value: Value) {
        let mut state = self.state.borrow_mut();
        if state.outcome.is_none() {
            state.outcome = Some(Ok(value));
        }
        state.try_deliver();
    }

    /// Reject the response with an exception-shaped error.
    pub fn reject(&self, error: RemoteError) {
        let mut state = self.state.borrow_mut();
        if state.outcome.is_none() {
            state.outcome = Some(Err(error));
        }
        state.try_deliver();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_arg_accessor() {
        let event = Event {
            name: "login".to_string(),
            args: vec![json!("alice"), json!(7)],
        };
        assert_eq!(event.arg(0), Some(&json!("alice")));
        assert_eq!(event.arg(2), None);
    }

    #[test]
    fn deferred_without_sink_settles_quietly() {
        let (_deferred, handle) = Deferred::pair();
        handle.resolve(json!(1));
        handle.resolve(json!(2)); // second settlement ignored
    }

    #[test]
    fn dead_session_sink_is_a_noop() {
        let (deferred, handle) = Deferred::pair();
        deferred.bind_sink(ResponseSink {
            session: Weak::new(),
            request_id: 1,
        });
        handle.reject(RemoteError::new("too late"));
    }

    #[test]
    fn first_settlement_wins() {
        let (deferred, handle) = Deferred::pair();
        handle.resolve(json!("first"));
        handle.reject(RemoteError::new("second"));

        let outcome = deferred.state.borrow().outcome.clone();
        assert_eq!(outcome, Some(Ok(json!("first"))));
    }

    #[test]
    fn handler_reply_from_value() {
        let reply: HandlerReply = json!(43).into();
        assert!(matches!(reply, HandlerReply::Value(v) if v == json!(43)));
    }
}
