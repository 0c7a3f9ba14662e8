//! Listener and reply-sink interfaces consumed by the engine.
//!
//! A caller hands the engine two objects per request:
//!
//! - a [`ReplySink`], owned by the engine until completion, which receives
//!   the raw body or the error
//! - a [`RequestListener`], only weakly referenced, which is told whether
//!   the request succeeded once the sink has been fed
//!
//! After completion the sink is wrapped in a reference-counted [`Reply`]
//! and passed to the listener, which may keep it as long as it likes.

use super::error::ReplyError;
use super::types::RequestId;
use bytes::{Bytes, BytesMut};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Receives completion notifications for requests.
///
/// Both methods run on the engine's dispatcher thread, never concurrently
/// with each other, so implementations may touch state that must only be
/// used from one thread at a time.
pub trait RequestListener: Send + Sync {
    /// Called after the reply sink accepted a response body.
    fn notify_for_success(&self, reply: Arc<Reply>);

    /// Called after the reply sink was handed an error.
    fn notify_for_failure(&self, reply: Arc<Reply>);
}

/// Accumulates the response of one request.
pub trait ReplySink: Send + Sync + 'static {
    /// Receives the response body.
    ///
    /// Returning `false` marks the data as rejected (e.g. unparseable). The
    /// request still completes on the success path.
    fn on_data_received(&mut self, data: Bytes) -> bool;

    /// Receives the failure for this request.
    fn on_error(&mut self, error: &ReplyError) {
        let _ = error;
    }

    /// Allows listeners to recover the concrete sink type from a [`Reply`].
    fn as_any(&self) -> &dyn Any;
}

/// Identity of a listener, derived from its address.
///
/// The engine only keeps [`Weak`] references to listeners, which keep the
/// allocation (and therefore the address) reserved, so a key can never be
/// reused while a request still refers to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(usize);

impl ListenerKey {
    /// Key for the given listener value.
    ///
    /// Works from `&*arc` as well as from `self` inside the listener.
    pub fn of<L: ?Sized>(listener: &L) -> Self {
        Self(listener as *const L as *const () as usize)
    }
}

/// Weak back-reference from a request to its listener.
#[derive(Clone)]
pub struct ListenerBinding {
    key: ListenerKey,
    listener: Weak<dyn RequestListener>,
}

impl ListenerBinding {
    /// Binds to the given listener without taking ownership.
    pub fn new<L: RequestListener + 'static>(listener: &Arc<L>) -> Self {
        let listener: Arc<dyn RequestListener> = Arc::clone(listener) as Arc<dyn RequestListener>;
        Self {
            key: ListenerKey::of(&*listener),
            listener: Arc::downgrade(&listener),
        }
    }

    /// Binds to an already type-erased listener.
    pub fn from_dyn(listener: &Arc<dyn RequestListener>) -> Self {
        Self {
            key: ListenerKey::of(&**listener),
            listener: Arc::downgrade(listener),
        }
    }

    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// Returns the listener if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn RequestListener>> {
        self.listener.upgrade()
    }
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("key", &self.key)
            .field("alive", &(self.listener.strong_count() > 0))
            .finish()
    }
}

/// Result of a finished request, handed to listeners.
pub struct Reply {
    id: RequestId,
    url: String,
    status_code: Option<u16>,
    content_type: Option<String>,
    from_cache: bool,
    accepted: bool,
    error: Option<ReplyError>,
    sink: Box<dyn ReplySink>,
}

impl Reply {
    pub(crate) fn success(
        id: RequestId,
        url: String,
        status_code: u16,
        content_type: Option<String>,
        from_cache: bool,
        accepted: bool,
        sink: Box<dyn ReplySink>,
    ) -> Self {
        Self {
            id,
            url,
            status_code: Some(status_code),
            content_type,
            from_cache,
            accepted,
            error: None,
            sink,
        }
    }

    pub(crate) fn failure(
        id: RequestId,
        url: String,
        error: ReplyError,
        sink: Box<dyn ReplySink>,
    ) -> Self {
        Self {
            id,
            url,
            status_code: error.http_status_code(),
            content_type: None,
            from_cache: false,
            accepted: false,
            error: Some(error),
            sink,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP status of the response, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// True when the body came from the tile cache instead of the network.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// False when the sink rejected the body it was handed.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ReplyError> {
        self.error.as_ref()
    }

    /// The sink that received the body or error.
    pub fn sink(&self) -> &dyn ReplySink {
        self.sink.as_ref()
    }

    /// Downcasts the sink to its concrete type.
    pub fn sink_as<T: ReplySink>(&self) -> Option<&T> {
        self.sink.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("status_code", &self.status_code)
            .field("from_cache", &self.from_cache)
            .field("accepted", &self.accepted)
            .field("error", &self.error)
            .finish()
    }
}

/// Reply sink that keeps the raw body in memory.
#[derive(Debug, Default)]
pub struct BufferReply {
    data: BytesMut,
    error: Option<ReplyError>,
    max_len: Option<usize>,
}

impl BufferReply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects bodies larger than `max_len` bytes.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    /// Received body (empty until data arrives).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn error(&self) -> Option<&ReplyError> {
        self.error.as_ref()
    }
}

impl ReplySink for BufferReply {
    fn on_data_received(&mut self, data: Bytes) -> bool {
        if let Some(max) = self.max_len {
            if self.data.len() + data.len() > max {
                return false;
            }
        }
        self.data.extend_from_slice(&data);
        true
    }

    fn on_error(&mut self, error: &ReplyError) {
        self.error = Some(error.clone());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
