//! The REST engine façade.
//!
//! [`RestEngine`] wires the registry, the worker pool and the completion
//! dispatcher together and exposes the request API used by query objects.

use super::dispatcher::{CompletionDispatcher, DispatchEvent};
use super::error::{EngineError, ReplyError};
use super::listener::{ListenerBinding, ListenerKey, ReplySink, RequestListener};
use super::registry::{AbortOutcome, EngineStats, Registry, RequestInfo};
use super::types::{RequestId, RequestStatus};
use super::worker::{RetryPolicy, WorkQueue, WorkerPool};
use crate::transport::{
    ReqwestTransport, Transport, TransportRequest, TransportResponse, DEFAULT_TIMEOUT_SECS,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 8;

/// Upper bound for the worker pool size.
pub const MAX_WORKER_THREADS: usize = 64;

/// Default registry capacity.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 256;

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Engine configuration.
///
/// Fixed once the engine is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of worker threads (default: 8)
    pub worker_threads: usize,
    /// Per-request transport timeout (default: 20s)
    pub request_timeout: Duration,
    /// Maximum number of requests held by the registry (default: 256)
    pub max_pending_requests: usize,
    /// User agent sent with every request
    pub user_agent: Option<String>,
    /// Retries for transient failures (default: 0, disabled)
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            user_agent: None,
            max_retries: 0,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl EngineConfig {
    /// Set the worker pool size, clamped to `1..=64`.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, MAX_WORKER_THREADS);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the registry capacity (at least 1).
    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Enable retries of transient failures.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Retry behaviour the workers apply.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
        }
    }
}

/// Asynchronous REST request engine.
///
/// Requests are registered and queued synchronously; a fixed pool of worker
/// threads runs them and a single dispatcher thread delivers every result.
/// Listeners are referenced weakly: dropping one never leaves the engine
/// with a dangling reference, but owners should still call
/// [`abort_listener_requests`](Self::abort_listener_requests) or
/// [`unregister_listener`](Self::unregister_listener) first if they do not
/// want late callbacks.
///
/// # Example
///
/// ```ignore
/// use maprest::engine::{BufferReply, EngineConfig, RestEngine};
///
/// let engine = RestEngine::new(EngineConfig::default())?;
/// let id = engine.open_get("https://example.com/tile/1", &listener, BufferReply::new());
/// assert!(id.is_valid());
/// ```
pub struct RestEngine {
    config: EngineConfig,
    registry: Arc<Registry>,
    queue: Arc<WorkQueue>,
    events: Sender<DispatchEvent>,
    workers: Mutex<Option<WorkerPool>>,
    dispatcher: Mutex<CompletionDispatcher>,
    shut_down: AtomicBool,
}

impl RestEngine {
    /// Creates an engine backed by the reqwest transport.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let transport = ReqwestTransport::with_timeout(
            config.request_timeout,
            config.user_agent.as_deref(),
        )
        .map_err(EngineError::Client)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates an engine with a custom transport.
    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineError> {
        let registry = Arc::new(Registry::new(config.max_pending_requests));
        let queue = Arc::new(WorkQueue::new());
        let dispatcher = CompletionDispatcher::spawn(Arc::clone(&registry))?;
        let events = dispatcher.sender();

        let workers = WorkerPool::spawn(
            config.worker_threads,
            Arc::clone(&queue),
            Arc::clone(&registry),
            transport,
            events.clone(),
            config.retry_policy(),
        )?;

        info!(
            workers = config.worker_threads,
            timeout_secs = config.request_timeout.as_secs(),
            max_pending = config.max_pending_requests,
            "REST engine started"
        );

        Ok(Self {
            config,
            registry,
            queue,
            events,
            workers: Mutex::new(Some(workers)),
            dispatcher: Mutex::new(dispatcher),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers and queues a request.
    ///
    /// Returns immediately; the result is delivered on the dispatcher
    /// thread. Fails if the engine is shut down or the registry is full.
    pub fn submit(
        &self,
        request: TransportRequest,
        listener: Option<ListenerBinding>,
        sink: Box<dyn ReplySink>,
    ) -> Result<RequestId, EngineError> {
        self.ensure_running()?;

        let url = request.url.clone();
        let id = self.registry.register(request, listener, sink)?;
        self.registry.advance(id, RequestStatus::Queued);

        if !self.queue.push(id) {
            // Lost a race with shutdown.
            self.registry.abort(id);
            return Err(EngineError::InvalidState("engine is shut down"));
        }

        debug!(request_id = %id, url = %url, "Request queued");
        Ok(id)
    }

    /// Opens a request, returning [`RequestId::INVALID`] on refusal.
    ///
    /// `post` selects POST with `body`; otherwise a GET is issued and `body`
    /// is ignored.
    pub fn open_request<L, S>(
        &self,
        url: &str,
        listener: &Arc<L>,
        sink: S,
        post: bool,
        body: &[u8],
    ) -> RequestId
    where
        L: RequestListener + 'static,
        S: ReplySink,
    {
        let request = if post {
            TransportRequest::post(url, Bytes::copy_from_slice(body))
        } else {
            TransportRequest::get(url)
        };
        self.submit(request, Some(ListenerBinding::new(listener)), Box::new(sink))
            .unwrap_or(RequestId::INVALID)
    }

    /// Opens a GET request.
    pub fn open_get<L, S>(&self, url: &str, listener: &Arc<L>, sink: S) -> RequestId
    where
        L: RequestListener + 'static,
        S: ReplySink,
    {
        self.open_request(url, listener, sink, false, &[])
    }

    /// Opens a POST request.
    pub fn open_post<L, S>(&self, url: &str, body: &[u8], listener: &Arc<L>, sink: S) -> RequestId
    where
        L: RequestListener + 'static,
        S: ReplySink,
    {
        self.open_request(url, listener, sink, true, body)
    }

    /// Fire-and-forget request.
    ///
    /// Returns [`RequestId::PASSIVE`] when accepted; the request cannot be
    /// aborted individually and no listener is notified.
    pub fn open_passive<S: ReplySink>(&self, request: TransportRequest, sink: S) -> RequestId {
        match self.submit(request, None, Box::new(sink)) {
            Ok(_) => RequestId::PASSIVE,
            Err(_) => RequestId::INVALID,
        }
    }

    /// Registers a request whose outcome is already known and delivers it
    /// through the dispatcher without touching the network.
    pub(crate) fn complete_locally(
        &self,
        request: TransportRequest,
        listener: Option<ListenerBinding>,
        sink: Box<dyn ReplySink>,
        result: Result<TransportResponse, ReplyError>,
    ) -> Result<RequestId, EngineError> {
        self.ensure_running()?;

        let id = self.registry.register(request, listener, sink)?;
        self.registry.advance(id, RequestStatus::Queued);
        if self.registry.claim(id).is_none() {
            return Err(EngineError::InvalidState("request vanished before delivery"));
        }

        let event = DispatchEvent::Completed {
            id,
            result,
            from_cache: true,
        };
        if self.events.send(event).is_err() {
            self.registry.abort(id);
            self.registry.finish(id);
            return Err(EngineError::InvalidState("dispatcher is not running"));
        }
        Ok(id)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(EngineError::InvalidState("engine is shut down"));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cancellation
    // ─────────────────────────────────────────────────────────────────────────

    /// Aborts one request.
    ///
    /// A queued request is removed before any worker sees it and no callback
    /// fires. An in-flight request has its result discarded on arrival.
    pub fn abort_request(&self, id: RequestId) -> AbortOutcome {
        let outcome = self.registry.abort(id);
        if outcome == AbortOutcome::Removed {
            self.queue.remove(id);
        }
        debug!(request_id = %id, ?outcome, "Abort requested");
        outcome
    }

    /// Aborts every request bound to `listener`.
    ///
    /// Pass the listener itself (`&*arc`, or `self` from inside the
    /// listener), not the `Arc`. Returns the number of requests aborted.
    pub fn abort_listener_requests<L: ?Sized>(&self, listener: &L) -> usize {
        let result = self.registry.abort_listener(ListenerKey::of(listener));
        self.queue.remove_all(&result.removed);
        result.total()
    }

    /// Aborts every pending request.
    pub fn abort_all_requests(&self) -> usize {
        let result = self.registry.abort_all();
        self.queue.remove_all(&result.removed);
        if result.total() > 0 {
            debug!(
                removed = result.removed.len(),
                flagged = result.flagged.len(),
                "Aborted all requests"
            );
        }
        result.total()
    }

    /// Stops notifying `listener` without aborting its requests.
    pub fn unregister_listener<L: ?Sized>(&self, listener: &L) -> usize {
        self.registry.unregister_listener(ListenerKey::of(listener))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of requests an observer could still hear about.
    pub fn num_pending_requests(&self) -> usize {
        self.registry.len()
    }

    pub fn max_pending_requests(&self) -> usize {
        self.registry.max_pending()
    }

    pub fn request_status(&self, id: RequestId) -> Option<RequestStatus> {
        self.registry.status(id)
    }

    pub fn stats(&self) -> EngineStats {
        self.registry.stats()
    }

    /// Outstanding requests, oldest first.
    pub fn snapshot(&self) -> Vec<RequestInfo> {
        self.registry.snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Aborts everything, joins all threads and refuses further requests.
    ///
    /// Calling it again is a no-op. Safe to call from a listener callback,
    /// or to drop the last engine handle there.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let aborted = self.abort_all_requests();
        self.queue.close();

        if let Some(workers) = self.workers.lock().take() {
            workers.join();
        }
        // From a listener callback the in-progress request is finished
        // by the dispatcher once the callback returns.
        let joined = self.dispatcher.lock().shutdown();

        let leftover = self.registry.len();
        if joined && leftover > 0 {
            warn!(leftover, "Requests left in registry after shutdown");
        }
        info!(aborted, "REST engine shut down");
    }
}

impl Drop for RestEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
