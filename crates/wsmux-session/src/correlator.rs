use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;
use wsmux_wire::ErrorPayload;

use crate::error::RequestError;

/// The requester-side view of an in-flight request.
///
/// Settled exactly once by the correlator: with the peer's response,
/// with a timeout, or with an abort. There is no implicit retry.
#[derive(Clone, Debug)]
pub struct Reply {
    state: Rc<RefCell<ReplyState>>,
}

#[derive(Debug)]
enum ReplyState {
    Pending,
    Settled(std::result::Result<Value, RequestError>),
}

impl Reply {
    fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ReplyState::Pending)),
        }
    }

    /// True once the request has a terminal outcome.
    pub fn is_settled(&self) -> bool {
        matches!(*self.state.borrow(), ReplyState::Settled(_))
    }

    /// The outcome, if the request has settled.
    pub fn try_result(&self) -> Option<std::result::Result<Value, RequestError>> {
        match &*self.state.borrow() {
            ReplyState::Pending => None,
            ReplyState::Settled(result) => Some(result.clone()),
        }
    }

    fn settle(&self, result: std::result::Result<Value, RequestError>) {
        let mut state = self.state.borrow_mut();
        // First writer wins; the correlator removes the entry on
        // settlement so a second write should be unreachable anyway.
        if matches!(*state, ReplyState::Pending) {
            *state = ReplyState::Settled(result);
        }
    }
}

struct PendingRequest {
    reply: Reply,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

/// Issues request ids and matches responses back to waiting replies.
///
/// Ids increase monotonically and are never reused; entries leave the
/// pending table by exactly one of: response, timeout, abort.
pub struct Correlator {
    next_id: u64,
    pending: BTreeMap<u64, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Allocate the next id and register a pending reply.
    ///
    /// The deadline is armed immediately, before the request is
    /// transmitted, so queued requests time out like transmitted ones.
    pub fn allocate(&mut self, timeout: Option<Duration>, now: Instant) -> (u64, Reply) {
        self.next_id += 1;
        let id = self.next_id;
        let reply = Reply::new();
        self.pending.insert(
            id,
            PendingRequest {
                reply: reply.clone(),
                deadline: timeout.map(|t| now + t),
                timeout,
            },
        );
        (id, reply)
    }

    /// Drop a just-allocated entry whose request never left the session
    /// (e.g. the send queue was full). The id stays consumed.
    pub fn forget(&mut self, id: u64) {
        self.pending.remove(&id);
    }

    /// Settle the pending request for `id` with a decoded response.
    ///
    /// Returns false when no entry matches — a late response after a
    /// timeout, or an id this session never issued.
    pub fn settle(&mut self, id: u64, result: std::result::Result<Value, ErrorPayload>) -> bool {
        let Some(entry) = self.pending.remove(&id) else {
            debug!(id, "response for unknown or expired request ignored");
            return false;
        };
        let result = result.map_err(|payload| match payload {
            ErrorPayload::Exception(err) => RequestError::Rejected(err),
            ErrorPayload::Value(value) => RequestError::RejectedValue(value),
        });
        entry.reply.settle(result);
        true
    }

    /// Reject every pending request whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            if let Some(entry) = self.pending.remove(id) {
                let timeout = entry.timeout.unwrap_or_default();
                debug!(id, ?timeout, "request timed out");
                entry.reply.settle(Err(RequestError::Timeout(timeout)));
            }
        }
        expired.len()
    }

    /// Reject every pending request with an abort error and clear the table.
    pub fn abort_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, entry) in std::mem::take(&mut self.pending) {
            entry.reply.settle(Err(RequestError::Aborted));
        }
        count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wsmux_wire::RemoteError;

    use super::*;

    #[test]
    fn ids_increase_monotonically_from_one() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let (first, _) = correlator.allocate(None, now);
        let (second, _) = correlator.allocate(None, now);
        let (third, _) = correlator.allocate(None, now);
        assert_eq!((first, second, third), (1, 2, 3));
    }

    #[test]
    fn settle_fulfils_matching_reply() {
        let mut correlator = Correlator::new();
        let (id, reply) = correlator.allocate(None, Instant::now());
        assert!(!reply.is_settled());

        assert!(correlator.settle(id, Ok(json!(43))));
        assert_eq!(reply.try_result(), Some(Ok(json!(43))));
        assert!(!correlator.contains(id));
    }

    #[test]
    fn settle_rejects_with_exception() {
        let mut correlator = Correlator::new();
        let (id, reply) = correlator.allocate(None, Instant::now());

        let err = RemoteError::new("denied");
        correlator.settle(id, Err(ErrorPayload::Exception(err.clone())));
        assert_eq!(reply.try_result(), Some(Err(RequestError::Rejected(err))));
    }

    #[test]
    fn settle_unknown_id_is_noop() {
        let mut correlator = Correlator::new();
        assert!(!correlator.settle(99, Ok(Value::Null)));
    }

    #[test]
    fn expiry_rejects_with_timeout_and_removes_entry() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let timeout = Duration::from_millis(50);
        let (id, reply) = correlator.allocate(Some(timeout), now);

        assert_eq!(correlator.expire(now + Duration::from_millis(49)), 0);
        assert!(!reply.is_settled());

        assert_eq!(correlator.expire(now + Duration::from_millis(50)), 1);
        assert_eq!(reply.try_result(), Some(Err(RequestError::Timeout(timeout))));
        assert!(!correlator.contains(id));
    }

    #[test]
    fn late_response_after_expiry_is_ignored() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let (id, reply) = correlator.allocate(Some(Duration::from_millis(5)), now);

        correlator.expire(now + Duration::from_secs(1));
        assert!(!correlator.settle(id, Ok(json!("late"))));
        // Timeout outcome stands.
        assert_eq!(
            reply.try_result(),
            Some(Err(RequestError::Timeout(Duration::from_millis(5))))
        );
    }

    #[test]
    fn requests_without_timeout_never_expire() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let (_, reply) = correlator.allocate(None, now);

        correlator.expire(now + Duration::from_secs(3600));
        assert!(!reply.is_settled());
    }

    #[test]
    fn abort_rejects_everything() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let (_, first) = correlator.allocate(None, now);
        let (_, second) = correlator.allocate(Some(Duration::from_secs(5)), now);

        assert_eq!(correlator.abort_all(), 2);
        assert_eq!(first.try_result(), Some(Err(RequestError::Aborted)));
        assert_eq!(second.try_result(), Some(Err(RequestError::Aborted)));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn forget_removes_entry_but_consumes_id() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        let (id, _) = correlator.allocate(None, now);
        correlator.forget(id);
        assert_eq!(correlator.pending_len(), 0);

        let (next, _) = correlator.allocate(None, now);
        assert_eq!(next, id + 1);
    }
}
