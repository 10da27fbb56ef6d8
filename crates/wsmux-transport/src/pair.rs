use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Readiness, Transport, TransportEvent};

/// In-memory linked pair of transports.
///
/// The reference transport for tests and examples: whatever one
/// endpoint sends appears as a `Message` event on the other. Both
/// endpoints start in `Connecting`; call [`PairTransport::open`] on
/// each to bring the link up. Closing either endpoint closes the link.
///
/// Single-threaded by design, like everything in wsmux.
pub struct PairTransport {
    local: Rc<RefCell<Endpoint>>,
    remote: Rc<RefCell<Endpoint>>,
}

struct Endpoint {
    readiness: Readiness,
    inbox: VecDeque<TransportEvent>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            readiness: Readiness::Connecting,
            inbox: VecDeque::new(),
        }
    }
}

impl PairTransport {
    /// Create two linked endpoints, both in `Connecting` state.
    pub fn pair() -> (Self, Self) {
        let a = Rc::new(RefCell::new(Endpoint::new()));
        let b = Rc::new(RefCell::new(Endpoint::new()));
        (
            Self {
                local: Rc::clone(&a),
                remote: Rc::clone(&b),
            },
            Self {
                local: b,
                remote: a,
            },
        )
    }

    /// Transition this endpoint to open and queue its `Open` event.
    pub fn open(&mut self) {
        let mut local = self.local.borrow_mut();
        if local.readiness == Readiness::Open {
            return;
        }
        local.readiness = Readiness::Open;
        local.inbox.push_back(TransportEvent::Open);
        debug!("pair endpoint opened");
    }

    /// Queue an `Error` event on this endpoint, for failure-path tests.
    pub fn inject_error(&mut self, description: &str) {
        self.local
            .borrow_mut()
            .inbox
            .push_back(TransportEvent::Error(description.to_string()));
    }

    /// Number of messages delivered to the peer but not yet polled.
    pub fn peer_backlog(&self) -> usize {
        self.remote
            .borrow()
            .inbox
            .iter()
            .filter(|event| matches!(event, TransportEvent::Message(_)))
            .count()
    }
}

impl Transport for PairTransport {
    fn readiness(&self) -> Readiness {
        self.local.borrow().readiness
    }

    fn send(&mut self, data: &str) -> Result<()> {
        let readiness = self.local.borrow().readiness;
        if readiness != Readiness::Open {
            return Err(TransportError::NotOpen(readiness));
        }
        let mut remote = self.remote.borrow_mut();
        if remote.readiness == Readiness::Open {
            remote
                .inbox
                .push_back(TransportEvent::Message(data.to_string()));
        }
        // A message sent to a closed peer is lost, like on a real socket.
        Ok(())
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        debug!(?code, ?reason, "pair endpoint closing");
        let mut local = self.local.borrow_mut();
        if local.readiness == Readiness::Closed {
            return Ok(());
        }
        local.readiness = Readiness::Closed;
        local.inbox.push_back(TransportEvent::Closed);
        drop(local);

        let mut remote = self.remote.borrow_mut();
        if remote.readiness != Readiness::Closed {
            remote.readiness = Readiness::Closed;
            remote.inbox.push_back(TransportEvent::Closed);
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.local.borrow_mut().inbox.pop_front()
    }
}
