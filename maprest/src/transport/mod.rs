//! Blocking HTTP(S) transport.
//!
//! The transport performs exactly one GET or POST per call and reports the
//! raw body plus status, or a [`CommunicationError`]. It never talks to
//! listeners; the worker pool owns that hand-off.

mod http;
mod types;

pub use http::{ReqwestTransport, Transport, DEFAULT_TIMEOUT_SECS};
pub use types::{
    CommunicationError, ErrorCategory, HttpMethod, TransportRequest, TransportResponse,
};
