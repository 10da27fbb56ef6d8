use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};
use wsmux_transport::{Readiness, Transport, TransportEvent};
use wsmux_wire::{decode, encode, Envelope, ErrorPayload, RemoteError};

use crate::channel::{Channel, ChannelState};
use crate::correlator::{Correlator, Reply};
use crate::error::{Result, SessionError};
use crate::listener::{Event, HandlerReply, HandlerResult, ListenerId, ResponseSink};
use crate::pipeline::{self, Continuation, PipelineOutcome};
use crate::queue::SendQueue;

/// Default bound of the send queue.
pub const DEFAULT_MAX_QUEUE_LEN: usize = 10;

/// Session behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default timeout applied to every request. `None` disables
    /// timeouts; a per-channel one-shot override takes precedence.
    pub request_timeout: Option<Duration>,
    /// Maximum number of queued outbound messages while disconnected.
    pub max_queue_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) queue: SendQueue,
    pub(crate) correlator: Correlator,
    pub(crate) root: ChannelState,
    pub(crate) channels: HashMap<String, ChannelState>,
    pub(crate) data: HashMap<String, Value>,
    pub(crate) config: SessionConfig,
    /// Whether the bound transport has reported open; only used to tell
    /// close listeners whether a live connection was lost.
    pub(crate) opened: bool,
    pub(crate) next_listener_id: u64,
}

impl Inner {
    pub(crate) fn existing_state(&mut self, channel: Option<&str>) -> Option<&mut ChannelState> {
        match channel {
            None => Some(&mut self.root),
            Some(name) => self.channels.get_mut(name),
        }
    }

    pub(crate) fn state_mut(&mut self, channel: Option<&str>) -> &mut ChannelState {
        match channel {
            None => &mut self.root,
            Some(name) => self
                .channels
                .entry(name.to_string())
                .or_insert_with(ChannelState::new),
        }
    }

    pub(crate) fn middleware_for(
        &mut self,
        channel: Option<&str>,
    ) -> Option<Vec<crate::pipeline::Middleware>> {
        self.existing_state(channel)
            .map(|state| state.middleware.clone())
    }

    /// Resolve the timeout for the next request on `channel`: a pending
    /// one-shot override wins, else the session default.
    pub(crate) fn take_request_timeout(&mut self, channel: Option<&str>) -> Option<Duration> {
        let default = self.config.request_timeout;
        match self.existing_state(channel) {
            Some(state) => state.temp_timeout.take().unwrap_or(default),
            None => default,
        }
    }

    /// Snapshot the listeners for one event, removing `once` entries.
    ///
    /// Removal happens before invocation so a re-entrant emit cannot
    /// fire a one-shot listener twice.
    pub(crate) fn take_listeners(
        &mut self,
        channel: Option<&str>,
        event: &str,
    ) -> Vec<crate::listener::Handler> {
        let Some(state) = self.existing_state(channel) else {
            return Vec::new();
        };
        let Some(entries) = state.listeners.get_mut(event) else {
            return Vec::new();
        };
        let snapshot: Vec<_> = entries
            .iter()
            .map(|entry| Rc::clone(&entry.handler))
            .collect();
        entries.retain(|entry| !entry.once);
        snapshot
    }

    /// Transmit now if the transport is open, otherwise queue.
    pub(crate) fn send_text(&mut self, text: String, ignore_bound: bool) -> Result<()> {
        if let Some(transport) = self.transport.as_mut() {
            if transport.readiness() == Readiness::Open {
                debug!("sending message");
                transport.send(&text)?;
                return Ok(());
            }
        }
        self.queue.push(text, ignore_bound)
    }

    /// Walk the send queue from the front while the transport stays
    /// open. A message leaves the queue only after a successful send,
    /// so a mid-flush failure keeps the untransmitted suffix queued.
    fn flush(&mut self) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };
        while let Some(front) = self.queue.front() {
            if transport.readiness() != Readiness::Open {
                break;
            }
            transport.send(front)?;
            self.queue.pop_front();
        }
        Ok(())
    }
}

pub(crate) fn send_envelope(
    inner: &Rc<RefCell<Inner>>,
    envelope: &Envelope,
    ignore_bound: bool,
) -> Result<()> {
    let text = encode(envelope)?;
    inner.borrow_mut().send_text(text, ignore_bound)
}

pub(crate) fn send_resolve(inner: &Rc<RefCell<Inner>>, request_id: u64, value: Value) {
    let envelope = Envelope::resolve(request_id, value);
    if let Err(error) = send_envelope(inner, &envelope, true) {
        warn!(%error, request_id, "failed to send success response");
    }
}

pub(crate) fn send_reject(inner: &Rc<RefCell<Inner>>, request_id: u64, payload: ErrorPayload) {
    let envelope = Envelope::Response {
        request_id,
        result: Err(payload),
    };
    if let Err(error) = send_envelope(inner, &envelope, true) {
        warn!(%error, request_id, "failed to send rejection response");
    }
}

/// Deliver a lifecycle notification to root listeners, bypassing the
/// middleware pipeline and response machinery.
pub(crate) fn emit_local(inner: &Rc<RefCell<Inner>>, event: &str, args: Vec<Value>) {
    let handlers = inner.borrow_mut().take_listeners(None, event);
    if handlers.is_empty() {
        return;
    }
    let event = Event {
        name: event.to_string(),
        args,
    };
    for handler in handlers {
        // A listener whose closure is already executing (it re-entrantly
        // triggered its own event) is skipped, not recursed into.
        let Ok(mut listener) = handler.try_borrow_mut() else {
            warn!(event = %event.name, "skipped re-entrant invocation of a running listener");
            continue;
        };
        if let Err(error) = (&mut *listener)(&event) {
            warn!(%error, event = %event.name, "lifecycle listener failed");
        }
    }
}

/// Route one inbound dispatch: resolve the channel, run its middleware
/// pipeline, then invoke handlers and turn their replies into a
/// response when the dispatch carried a request id.
pub(crate) fn deliver_dispatch(
    inner: &Rc<RefCell<Inner>>,
    channel: Option<String>,
    event_name: String,
    args: Vec<Value>,
    request_id: Option<u64>,
) {
    let middleware = inner.borrow_mut().middleware_for(channel.as_deref());
    let Some(middleware) = middleware else {
        let name = channel.as_deref().unwrap_or_default();
        debug!(event = %event_name, channel = name, "event ignored: channel does not exist");
        if let Some(id) = request_id {
            send_reject(
                inner,
                id,
                ErrorPayload::Exception(RemoteError::new(format!(
                    "channel '{name}' does not exist"
                ))),
            );
        }
        return;
    };

    match pipeline::run(&middleware, &event_name, &args) {
        PipelineOutcome::Proceed => {}
        PipelineOutcome::Stalled => return,
        PipelineOutcome::Abort(payload) => {
            if let Some(id) = request_id {
                send_reject(inner, id, payload);
            } else {
                warn!(event = %event_name, "interceptor aborted one-way event");
            }
            return;
        }
    }

    let handlers = inner
        .borrow_mut()
        .take_listeners(channel.as_deref(), &event_name);
    if handlers.is_empty() {
        let message = match channel.as_deref() {
            Some(name) => format!("no event listener for '{event_name}' on channel '{name}'"),
            None => format!("no event listener for '{event_name}'"),
        };
        debug!(%message, "event dropped");
        if let Some(id) = request_id {
            send_reject(inner, id, ErrorPayload::Exception(RemoteError::new(message)));
        }
        return;
    }

    let event = Event {
        name: event_name,
        args,
    };
    for handler in handlers {
        let Ok(mut listener) = handler.try_borrow_mut() else {
            warn!(event = %event.name, "skipped re-entrant invocation of a running listener");
            continue;
        };
        let outcome = (&mut *listener)(&event);
        match outcome {
            Err(error) => {
                if let Some(id) = request_id {
                    send_reject(inner, id, ErrorPayload::Exception(error));
                } else {
                    warn!(event = %event.name, %error, "handler failed for one-way event");
                }
            }
            Ok(HandlerReply::Value(value)) => {
                if let Some(id) = request_id {
                    send_resolve(inner, id, value);
                }
            }
            Ok(HandlerReply::Deferred(deferred)) => {
                if let Some(id) = request_id {
                    deferred.bind_sink(ResponseSink {
                        session: Rc::downgrade(inner),
                        request_id: id,
                    });
                }
            }
        }
    }
}

fn handle_message(inner: &Rc<RefCell<Inner>>, text: &str) {
    emit_local(inner, "message", vec![Value::String(text.to_string())]);
    match decode(text) {
        Err(error) => debug!(%error, "dropping unrecognized message"),
        Ok(Envelope::Ignored) => debug!("dropping explicitly ignored message"),
        Ok(Envelope::Response { request_id, result }) => {
            inner.borrow_mut().correlator.settle(request_id, result);
        }
        Ok(Envelope::Dispatch {
            channel,
            event,
            args,
            request_id,
        }) => deliver_dispatch(inner, channel, event, args, request_id),
    }
}

fn handle_open(inner: &Rc<RefCell<Inner>>) -> Result<()> {
    {
        let mut guard = inner.borrow_mut();
        guard.opened = true;
        guard.flush()?;
    }
    emit_local(inner, "open", Vec::new());
    Ok(())
}

fn handle_close(inner: &Rc<RefCell<Inner>>) {
    let was_open = {
        let mut guard = inner.borrow_mut();
        std::mem::replace(&mut guard.opened, false)
    };
    emit_local(inner, "close", vec![Value::Bool(was_open)]);
    emit_local(inner, "disconnect", vec![Value::Bool(was_open)]);
}

/// Drain every queued transport event. Returns whether an open event
/// was among them.
fn drain_events(inner: &Rc<RefCell<Inner>>) -> Result<bool> {
    let mut saw_open = false;
    loop {
        let event = {
            let mut guard = inner.borrow_mut();
            guard.transport.as_mut().and_then(|t| t.poll_event())
        };
        let Some(event) = event else {
            return Ok(saw_open);
        };
        match event {
            TransportEvent::Open => {
                saw_open = true;
                handle_open(inner)?;
            }
            TransportEvent::Message(text) => handle_message(inner, &text),
            TransportEvent::Error(description) => {
                emit_local(inner, "error", vec![Value::String(description)]);
            }
            TransportEvent::Closed => handle_close(inner),
        }
    }
}

/// Root channel plus connection manager.
///
/// Owns the transport binding, the send queue, the request correlator,
/// and the registry of named channels. Emitter-style calls on the
/// session itself address the root channel.
pub struct Session {
    inner: Rc<RefCell<Inner>>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let max_queue_len = config.max_queue_len;
        Self {
            inner: Rc::new(RefCell::new(Inner {
                transport: None,
                queue: SendQueue::new(max_queue_len),
                correlator: Correlator::new(),
                root: ChannelState::new(),
                channels: HashMap::new(),
                data: HashMap::new(),
                config,
                opened: false,
                next_listener_id: 0,
            })),
        }
    }

    /// Bind (or rebind) a transport.
    ///
    /// The previous transport, if any, is dropped, which detaches its
    /// event delivery. Pending requests and queued messages are
    /// preserved: rebinding is the reconnection mechanism, and only an
    /// explicit [`Session::abort`] clears protocol state. If the new
    /// transport already reports itself open, the open-time flush runs
    /// immediately.
    pub fn bind(&self, transport: Box<dyn Transport>) -> Result<()> {
        let already_open = transport.readiness() == Readiness::Open;
        self.inner.borrow_mut().transport = Some(transport);
        if already_open {
            // Consume whatever the transport queued before binding; if
            // its open notification was already gone, synthesize the
            // open-time flush here.
            let saw_open = drain_events(&self.inner)?;
            if !saw_open {
                handle_open(&self.inner)?;
            }
        }
        Ok(())
    }

    /// Process pending transport events and expire request timers
    /// against `now`.
    pub fn poll_at(&self, now: Instant) -> Result<()> {
        drain_events(&self.inner)?;
        self.inner.borrow_mut().correlator.expire(now);
        Ok(())
    }

    /// [`Session::poll_at`] with the current time.
    pub fn poll(&self) -> Result<()> {
        self.poll_at(Instant::now())
    }

    /// Reject every pending request with an abort error and clear the
    /// send queue. Does not close the transport.
    pub fn abort(&self) {
        let mut guard = self.inner.borrow_mut();
        let rejected = guard.correlator.abort_all();
        guard.queue.clear();
        debug!(rejected, "aborted pending requests and cleared send queue");
    }

    /// The channel registered under `namespace`, created on first
    /// lookup. The empty namespace addresses the root.
    pub fn of(&self, namespace: &str) -> Channel {
        if namespace.is_empty() {
            return self.root();
        }
        self.inner
            .borrow_mut()
            .channels
            .entry(namespace.to_string())
            .or_insert_with(ChannelState::new);
        Channel::new(Rc::downgrade(&self.inner), Some(namespace.to_string()))
    }

    /// A handle to the root channel.
    pub fn root(&self) -> Channel {
        Channel::new(Rc::downgrade(&self.inner), None)
    }

    pub fn is_connecting(&self) -> bool {
        self.readiness() == Some(Readiness::Connecting)
    }

    pub fn is_connected(&self) -> bool {
        self.readiness() == Some(Readiness::Open)
    }

    fn readiness(&self) -> Option<Readiness> {
        self.inner
            .borrow()
            .transport
            .as_ref()
            .map(|t| t.readiness())
    }

    /// Forward a close to the bound transport, if any.
    pub fn disconnect(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        if let Some(transport) = self.inner.borrow_mut().transport.as_mut() {
            transport.close(code, reason)?;
        }
        Ok(())
    }

    /// Read a session-scoped user-data entry.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.borrow().data.get(key).cloned()
    }

    /// Store a session-scoped user-data entry.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.borrow_mut().data.insert(key.into(), value);
    }

    /// Number of queued-but-unsent outbound messages.
    pub fn queued_messages(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.borrow().correlator.pending_len()
    }

    // Emitter surface, delegated to the root channel.

    pub fn on(
        &self,
        event: &str,
        handler: impl FnMut(&Event) -> HandlerResult + 'static,
    ) -> Result<ListenerId> {
        self.root().on(event, handler)
    }

    pub fn once(
        &self,
        event: &str,
        handler: impl FnMut(&Event) -> HandlerResult + 'static,
    ) -> Result<ListenerId> {
        self.root().once(event, handler)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> Result<bool> {
        self.root().off(event, id)
    }

    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.root().emit(event, args)
    }

    pub fn request(&self, event: &str, args: Vec<Value>) -> Result<Reply> {
        self.root().request(event, args)
    }

    pub fn use_middleware(
        &self,
        interceptor: impl FnMut(&str, &[Value], &mut Continuation) + 'static,
    ) -> Result<()> {
        self.root().use_middleware(interceptor)
    }

    pub fn timeout(&self, duration: Duration) -> Result<()> {
        self.root().timeout(duration)
    }

    pub fn no_timeout(&self) -> Result<()> {
        self.root().no_timeout()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
