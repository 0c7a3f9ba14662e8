//! Asynchronous REST request engine.
//!
//! # Architecture
//!
//! ```text
//! RestEngine::open_request
//!     │ register (Created) → Queued
//!     ▼
//! WorkQueue ──▶ worker threads (claim → InFlight → Transport::execute)
//!                   │
//!                   ▼ DispatchEvent::Completed
//!            dispatcher thread ──▶ ReplySink ──▶ RequestListener
//!                   │
//!                   ▼
//!            Registry::finish (entry removed)
//! ```
//!
//! The registry lock is held only for map edits. It is never held across a
//! transport call or a callback, and the tile cache never runs under it.

mod dispatcher;
mod error;
mod listener;
mod registry;
mod rest;
mod types;
mod worker;

pub use dispatcher::DispatchEvent;
pub use error::{EngineError, ParserError, ReplyError};
pub use listener::{BufferReply, ListenerBinding, ListenerKey, Reply, ReplySink, RequestListener};
pub use registry::{AbortOutcome, EngineStats, RequestInfo};
pub use rest::{
    EngineConfig, RestEngine, DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_WORKER_THREADS, MAX_WORKER_THREADS,
};
pub use types::{RequestId, RequestStatus};
pub use worker::RetryPolicy;
