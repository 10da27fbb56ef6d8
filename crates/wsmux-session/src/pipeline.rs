use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;
use wsmux_wire::{ErrorPayload, RemoteError};

/// An interceptor run before a channel's event handlers.
///
/// Receives the event name, its arguments, and a [`Continuation`] that
/// must be invoked exactly once before the interceptor returns.
pub type Middleware = Rc<RefCell<dyn FnMut(&str, &[Value], &mut Continuation)>>;

/// The single-shot continuation handed to each interceptor.
///
/// The first call wins; any further calls are silently ignored, which
/// turns an accidental double-continuation into a no-op instead of a
/// double dispatch.
pub struct Continuation {
    decision: Option<std::result::Result<(), ErrorPayload>>,
}

impl Continuation {
    fn new() -> Self {
        Self { decision: None }
    }

    /// Proceed to the next interceptor (or the event handlers).
    pub fn proceed(&mut self) {
        if self.decision.is_none() {
            self.decision = Some(Ok(()));
        }
    }

    /// Abort the chain with an exception-shaped error.
    pub fn fail(&mut self, error: RemoteError) {
        if self.decision.is_none() {
            self.decision = Some(Err(ErrorPayload::Exception(error)));
        }
    }

    /// Abort the chain with an arbitrary rejection value.
    pub fn fail_with(&mut self, value: Value) {
        if self.decision.is_none() {
            self.decision = Some(Err(ErrorPayload::Value(value)));
        }
    }
}

/// How a pipeline run ended.
pub enum PipelineOutcome {
    /// Every interceptor proceeded; the event goes to its handlers.
    Proceed,
    /// An interceptor never invoked its continuation; the event is
    /// dropped without a response (the requester's timeout is the
    /// backstop).
    Stalled,
    /// An interceptor aborted the chain.
    Abort(ErrorPayload),
}

/// Run `middleware` in registration order against one event.
///
/// Iterative rather than recursive: one index walk with a per-step
/// continuation guard.
pub fn run(middleware: &[Middleware], event: &str, args: &[Value]) -> PipelineOutcome {
    for interceptor in middleware {
        let mut continuation = Continuation::new();
        (&mut *interceptor.borrow_mut())(event, args, &mut continuation);
        match continuation.decision {
            Some(Ok(())) => {}
            Some(Err(error)) => return PipelineOutcome::Abort(error),
            None => {
                debug!(event, "interceptor did not continue; event dropped");
                return PipelineOutcome::Stalled;
            }
        }
    }
    PipelineOutcome::Proceed
}
