use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use wsmux_wire::{is_reserved_event, Envelope};

use crate::correlator::Reply;
use crate::error::{Result, SessionError};
use crate::listener::{Event, Handler, HandlerResult, ListenerEntry, ListenerId};
use crate::pipeline::{Continuation, Middleware};
use crate::session::{self, Inner};

/// Per-channel registration state: listeners, interceptors, and the
/// one-shot timeout override for the next request.
pub(crate) struct ChannelState {
    pub(crate) listeners: HashMap<String, Vec<ListenerEntry>>,
    pub(crate) middleware: Vec<Middleware>,
    /// `Some(Some(d))` overrides the next request's timeout with `d`;
    /// `Some(None)` disables it. Consumed by the next request.
    pub(crate) temp_timeout: Option<Option<Duration>>,
}

impl ChannelState {
    pub(crate) fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            middleware: Vec::new(),
            temp_timeout: None,
        }
    }
}

/// Handle to one namespace of a session.
///
/// Cheap to clone and safe to outlive the session: operations on a
/// handle whose session has been dropped fail with
/// [`SessionError::SessionGone`]. `name` is `None` for the root.
#[derive(Clone)]
pub struct Channel {
    inner: Weak<RefCell<Inner>>,
    name: Option<String>,
}

impl Channel {
    pub(crate) fn new(inner: Weak<RefCell<Inner>>, name: Option<String>) -> Self {
        Self { inner, name }
    }

    /// The channel's namespace, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn upgrade(&self) -> Result<Rc<RefCell<Inner>>> {
        self.inner.upgrade().ok_or(SessionError::SessionGone)
    }

    fn register(
        &self,
        event: &str,
        handler: impl FnMut(&Event) -> HandlerResult + 'static,
        once: bool,
    ) -> Result<ListenerId> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        guard.next_listener_id += 1;
        let id = ListenerId(guard.next_listener_id);
        let handler: Handler = Rc::new(RefCell::new(handler));
        guard
            .state_mut(self.name.as_deref())
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(ListenerEntry { id, once, handler });
        Ok(id)
    }

    /// Register a listener for `event`. Multiple listeners per event
    /// run in registration order.
    pub fn on(
        &self,
        event: &str,
        handler: impl FnMut(&Event) -> HandlerResult + 'static,
    ) -> Result<ListenerId> {
        self.register(event, handler, false)
    }

    /// Register a listener that is removed after its first invocation.
    pub fn once(
        &self,
        event: &str,
        handler: impl FnMut(&Event) -> HandlerResult + 'static,
    ) -> Result<ListenerId> {
        self.register(event, handler, true)
    }

    /// Remove one listener. Returns whether anything was removed.
    pub fn off(&self, event: &str, id: ListenerId) -> Result<bool> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        let Some(state) = guard.existing_state(self.name.as_deref()) else {
            return Ok(false);
        };
        let Some(entries) = state.listeners.get_mut(event) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        Ok(entries.len() != before)
    }

    /// Remove every listener for `event`, or for all events when
    /// `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) -> Result<()> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        if let Some(state) = guard.existing_state(self.name.as_deref()) {
            match event {
                Some(name) => {
                    state.listeners.remove(name);
                }
                None => state.listeners.clear(),
            }
        }
        Ok(())
    }

    /// Names of events that currently have at least one listener.
    pub fn event_names(&self) -> Result<Vec<String>> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        let mut names: Vec<String> = match guard.existing_state(self.name.as_deref()) {
            Some(state) => state
                .listeners
                .iter()
                .filter(|(_, entries)| !entries.is_empty())
                .map(|(name, _)| name.clone())
                .collect(),
            None => Vec::new(),
        };
        names.sort();
        Ok(names)
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> Result<usize> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        Ok(guard
            .existing_state(self.name.as_deref())
            .and_then(|state| state.listeners.get(event))
            .map_or(0, Vec::len))
    }

    /// Append an interceptor to this channel's middleware pipeline.
    pub fn use_middleware(
        &self,
        interceptor: impl FnMut(&str, &[Value], &mut Continuation) + 'static,
    ) -> Result<()> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        guard
            .state_mut(self.name.as_deref())
            .middleware
            .push(Rc::new(RefCell::new(interceptor)));
        Ok(())
    }

    /// Send a one-way event to the peer.
    ///
    /// Reserved event names on the root channel never reach the wire;
    /// they dispatch to local lifecycle listeners instead.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        let inner = self.upgrade()?;
        if self.name.is_none() && is_reserved_event(event) {
            session::emit_local(&inner, event, args);
            return Ok(());
        }
        let envelope = Envelope::event(self.name.clone(), event, args);
        session::send_envelope(&inner, &envelope, false)
    }

    /// Send a request and return a [`Reply`] that settles with the
    /// peer's response, a timeout, or an abort.
    ///
    /// When the send queue is full the request fails immediately and no
    /// pending entry is left behind; the allocated id stays consumed.
    pub fn request(&self, event: &str, args: Vec<Value>) -> Result<Reply> {
        let inner = self.upgrade()?;
        let (id, reply) = {
            let mut guard = inner.borrow_mut();
            let timeout = guard.take_request_timeout(self.name.as_deref());
            guard.correlator.allocate(timeout, Instant::now())
        };
        let envelope = Envelope::request(self.name.clone(), event.to_string(), args, id);
        match session::send_envelope(&inner, &envelope, false) {
            Ok(()) => Ok(reply),
            Err(error) => {
                inner.borrow_mut().correlator.forget(id);
                Err(error)
            }
        }
    }

    /// Override the timeout for the next request on this channel only.
    pub fn timeout(&self, duration: Duration) -> Result<()> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        guard.state_mut(self.name.as_deref()).temp_timeout = Some(Some(duration));
        Ok(())
    }

    /// Disable the timeout for the next request on this channel only.
    pub fn no_timeout(&self) -> Result<()> {
        let inner = self.upgrade()?;
        let mut guard = inner.borrow_mut();
        guard.state_mut(self.name.as_deref()).temp_timeout = Some(None);
        Ok(())
    }

    /// Read a session-scoped user-data entry. Shared with the session
    /// and every other channel handle.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let inner = self.upgrade()?;
        let value = inner.borrow().data.get(key).cloned();
        Ok(value)
    }

    /// Store a session-scoped user-data entry.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let inner = self.upgrade()?;
        inner.borrow_mut().data.insert(key.into(), value);
        Ok(())
    }
}
