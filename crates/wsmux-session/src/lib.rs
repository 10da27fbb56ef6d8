//! Session layer: channels, requests, and connection management.
//!
//! A [`Session`] binds one [`wsmux_transport::Transport`] at a time and
//! multiplexes any number of named [`Channel`]s over it. Events emitted
//! while disconnected are queued (up to a bound) and flushed when the
//! transport opens; requests are correlated by monotonically increasing
//! ids and settle a [`Reply`] with the peer's response, a timeout, or
//! an abort.
//!
//! Everything here is single-threaded and cooperative: the application
//! drives the session by calling [`Session::poll`], and handlers run on
//! the caller's stack.

pub mod channel;
pub mod correlator;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod queue;
pub mod session;

pub use channel::Channel;
pub use correlator::Reply;
pub use error::{RequestError, Result, SessionError};
pub use listener::{Deferred, DeferredHandle, Event, HandlerReply, HandlerResult, ListenerId};
pub use pipeline::{Continuation, Middleware, PipelineOutcome};
pub use session::{Session, SessionConfig, DEFAULT_MAX_QUEUE_LEN};
