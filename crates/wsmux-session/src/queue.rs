use std::collections::VecDeque;

use tracing::debug;

use crate::error::{Result, SessionError};

/// Bounded FIFO of serialized messages awaiting an open transport.
///
/// Overflow is a caller-visible failure, never a silent drop. Response
/// messages bypass the bound (`ignore_bound`): a response must not be
/// starved by an unrelated size limit.
pub struct SendQueue {
    items: VecDeque<String>,
    max_len: usize,
}

impl SendQueue {
    /// Create a queue holding at most `max_len` bounded messages.
    pub fn new(max_len: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_len,
        }
    }

    /// Append a serialized message.
    ///
    /// Fails with [`SessionError::QueueFull`] when the bound is reached,
    /// without mutating the queue, unless `ignore_bound` is set.
    pub fn push(&mut self, message: String, ignore_bound: bool) -> Result<()> {
        if !ignore_bound && self.items.len() >= self.max_len {
            return Err(SessionError::QueueFull {
                len: self.items.len(),
                max: self.max_len,
            });
        }
        debug!(queued = self.items.len() + 1, "queued outbound message");
        self.items.push_back(message);
        Ok(())
    }

    /// The oldest queued message, if any.
    pub fn front(&self) -> Option<&str> {
        self.items.front().map(String::as_str)
    }

    /// Remove the oldest queued message.
    pub fn pop_front(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
