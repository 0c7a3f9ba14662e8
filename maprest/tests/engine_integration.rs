//! Integration tests for the REST engine.
//!
//! These tests drive the public engine API with in-process transports and
//! verify:
//! - Success and failure delivery, including HTTP status codes
//! - Backpressure when the registry is full
//! - Silent cancellation of queued and in-flight requests
//! - Serialized, non-reentrant listener callbacks on the dispatcher thread
//! - Registry cleanup after completion and shutdown

use maprest::engine::{
    AbortOutcome, BufferReply, EngineConfig, Reply, ReplyError, RequestId, RequestListener,
    RestEngine,
};
use maprest::transport::{
    CommunicationError, HttpMethod, Transport, TransportRequest, TransportResponse,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// =============================================================================
// Test Helpers
// =============================================================================

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

/// Answers every request with a fixed result.
struct FixedTransport {
    result: Result<TransportResponse, CommunicationError>,
    calls: AtomicUsize,
}

impl FixedTransport {
    fn ok(body: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(TransportResponse::ok(body)),
            calls: AtomicUsize::new(0),
        })
    }

    fn status(code: u16) -> Arc<Self> {
        Arc::new(Self {
            result: Err(CommunicationError::http_status(code, format!("HTTP {}", code))),
            calls: AtomicUsize::new(0),
        })
    }
}

impl Transport for FixedTransport {
    fn execute(&self, _request: &TransportRequest) -> Result<TransportResponse, CommunicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Blocks every request until the gate is opened, echoing the URL.
struct GatedTransport {
    open: Mutex<bool>,
    changed: Condvar,
    entered: Mutex<mpsc::Sender<String>>,
    calls: AtomicUsize,
}

impl GatedTransport {
    fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::new(Self {
            open: Mutex::new(false),
            changed: Condvar::new(),
            entered: Mutex::new(tx),
            calls: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }
}

impl Transport for GatedTransport {
    fn execute(&self, request: &TransportRequest) -> Result<TransportResponse, CommunicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.lock().send(request.url.clone());

        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
        Ok(TransportResponse::ok(request.url.clone()))
    }
}

/// Answers after a delay derived from the URL's last path segment and
/// tracks how many calls run at once.
struct StaggeredTransport {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl StaggeredTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

impl Transport for StaggeredTransport {
    fn execute(&self, request: &TransportRequest) -> Result<TransportResponse, CommunicationError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let index: u64 = request
            .url
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
            .unwrap_or(0);
        thread::sleep(Duration::from_millis(1 + (index * 7) % 13));

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(TransportResponse::ok(request.url.clone()))
    }
}

/// Records the method and body of every request.
struct RecordingTransport {
    seen: Mutex<Vec<(HttpMethod, Vec<u8>)>>,
}

impl Transport for RecordingTransport {
    fn execute(&self, request: &TransportRequest) -> Result<TransportResponse, CommunicationError> {
        let body = request.body.as_ref().map(|b| b.to_vec()).unwrap_or_default();
        self.seen.lock().push((request.method, body));
        Ok(TransportResponse::ok(&b"ok"[..]))
    }
}

/// What a listener saw for one request.
#[derive(Debug)]
struct Outcome {
    id: RequestId,
    success: bool,
    status: Option<u16>,
    body: Vec<u8>,
    error: Option<ReplyError>,
    thread: Option<String>,
}

/// Forwards every notification to a channel.
struct Collector {
    tx: Mutex<mpsc::Sender<Outcome>>,
}

impl Collector {
    fn new() -> (Arc<Self>, mpsc::Receiver<Outcome>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx: Mutex::new(tx) }), rx)
    }

    fn forward(&self, reply: &Reply) {
        let body = reply
            .sink_as::<BufferReply>()
            .map(|b| b.data().to_vec())
            .unwrap_or_default();
        let _ = self.tx.lock().send(Outcome {
            id: reply.id(),
            success: reply.is_success(),
            status: reply.status_code(),
            body,
            error: reply.error().cloned(),
            thread: thread::current().name().map(str::to_string),
        });
    }
}

impl RequestListener for Collector {
    fn notify_for_success(&self, reply: Arc<Reply>) {
        self.forward(&reply);
    }

    fn notify_for_failure(&self, reply: Arc<Reply>) {
        self.forward(&reply);
    }
}

fn engine(transport: Arc<dyn Transport>, config: EngineConfig) -> RestEngine {
    RestEngine::with_transport(config, transport).unwrap()
}

/// Polls until the condition holds or the deadline passes.
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// =============================================================================
// Delivery
// =============================================================================

#[test]
fn test_success_delivers_body_and_status() {
    let engine = engine(FixedTransport::ok(b"ABC"), EngineConfig::default());
    let (listener, rx) = Collector::new();

    let id = engine.open_get("http://maps.test/geocode?q=berlin", &listener, BufferReply::new());
    assert!(id.is_valid());

    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(outcome.id, id);
    assert!(outcome.success);
    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.body, b"ABC");
    assert_eq!(outcome.thread.as_deref(), Some("maprest-dispatcher"));
}

#[test]
fn test_http_error_delivers_failure_with_status() {
    let engine = engine(FixedTransport::status(500), EngineConfig::default());
    let (listener, rx) = Collector::new();

    engine.open_get("http://maps.test/route", &listener, BufferReply::new());

    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.status, Some(500));
    assert!(matches!(outcome.error, Some(ReplyError::Communication(_))));
    assert!(outcome.body.is_empty());
}

#[test]
fn test_post_forwards_method_and_body() {
    let transport = Arc::new(RecordingTransport {
        seen: Mutex::new(Vec::new()),
    });
    let engine = engine(transport.clone(), EngineConfig::default());
    let (listener, rx) = Collector::new();

    engine.open_post("http://maps.test/search", b"{\"q\":\"cafe\"}", &listener, BufferReply::new());
    rx.recv_timeout(WAIT).unwrap();

    let seen = transport.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, HttpMethod::Post);
    assert_eq!(seen[0].1, b"{\"q\":\"cafe\"}");
}

#[test]
fn test_passive_request_runs_without_listener() {
    let transport = FixedTransport::ok(b"x");
    let engine = engine(transport.clone(), EngineConfig::default());

    let id = engine.open_passive(TransportRequest::get("http://maps.test/ping"), BufferReply::new());

    assert_eq!(id, RequestId::PASSIVE);
    assert!(wait_until(|| engine.stats().completed == 1));
    assert!(wait_until(|| engine.num_pending_requests() == 0));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_full_registry_refuses_requests() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(
        transport.clone(),
        EngineConfig::default()
            .with_worker_threads(1)
            .with_max_pending_requests(2),
    );
    let (listener, rx) = Collector::new();

    let first = engine.open_get("http://maps.test/1", &listener, BufferReply::new());
    let second = engine.open_get("http://maps.test/2", &listener, BufferReply::new());
    let third = engine.open_get("http://maps.test/3", &listener, BufferReply::new());

    assert!(first.is_valid());
    assert!(second.is_valid());
    assert_eq!(third, RequestId::INVALID);
    assert_eq!(engine.num_pending_requests(), 2);
    assert_eq!(engine.stats().rejected, 1);

    entered.recv_timeout(WAIT).unwrap();
    transport.release();

    rx.recv_timeout(WAIT).unwrap();
    rx.recv_timeout(WAIT).unwrap();
    assert!(wait_until(|| engine.num_pending_requests() == 0));

    // Capacity is available again once earlier requests finished.
    let fourth = engine.open_get("http://maps.test/4", &listener, BufferReply::new());
    assert!(fourth.is_valid());
    rx.recv_timeout(WAIT).unwrap();
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_abort_queued_request_is_silent() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(transport.clone(), EngineConfig::default().with_worker_threads(1));
    let (listener, rx) = Collector::new();

    let running = engine.open_get("http://maps.test/running", &listener, BufferReply::new());
    assert_eq!(entered.recv_timeout(WAIT).unwrap(), "http://maps.test/running");
    let queued = engine.open_get("http://maps.test/queued", &listener, BufferReply::new());

    assert_eq!(engine.abort_request(queued), AbortOutcome::Removed);
    assert_eq!(engine.request_status(queued), None);
    transport.release();

    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(outcome.id, running);
    assert!(rx.recv_timeout(QUIET).is_err());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert!(wait_until(|| engine.num_pending_requests() == 0));
}

#[test]
fn test_abort_in_flight_request_discards_result() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(transport.clone(), EngineConfig::default().with_worker_threads(1));
    let (listener, rx) = Collector::new();

    let id = engine.open_get("http://maps.test/slow", &listener, BufferReply::new());
    entered.recv_timeout(WAIT).unwrap();

    assert_eq!(engine.abort_request(id), AbortOutcome::Flagged);
    assert_eq!(engine.abort_request(id), AbortOutcome::AlreadyTerminal);
    transport.release();

    assert!(rx.recv_timeout(QUIET).is_err());
    assert!(wait_until(|| engine.num_pending_requests() == 0));
    assert_eq!(engine.stats().aborted, 1);
}

#[test]
fn test_abort_unknown_request() {
    let engine = engine(FixedTransport::ok(b""), EngineConfig::default());
    assert_eq!(engine.abort_request(RequestId::from_raw(9999)), AbortOutcome::NotFound);
    assert_eq!(engine.abort_request(RequestId::INVALID), AbortOutcome::NotFound);
}

#[test]
fn test_abort_listener_requests_only_touches_that_listener() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(transport.clone(), EngineConfig::default().with_worker_threads(1));
    let (blocker, _blocker_rx) = Collector::new();
    let (cancelled, cancelled_rx) = Collector::new();
    let (kept, kept_rx) = Collector::new();

    engine.open_get("http://maps.test/block", &blocker, BufferReply::new());
    entered.recv_timeout(WAIT).unwrap();
    engine.open_get("http://maps.test/a", &cancelled, BufferReply::new());
    engine.open_get("http://maps.test/b", &cancelled, BufferReply::new());
    engine.open_get("http://maps.test/c", &kept, BufferReply::new());

    assert_eq!(engine.abort_listener_requests(&*cancelled), 2);
    transport.release();

    assert!(kept_rx.recv_timeout(WAIT).unwrap().success);
    assert!(cancelled_rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_dropped_listener_is_not_notified() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(transport.clone(), EngineConfig::default().with_worker_threads(1));
    let (listener, rx) = Collector::new();

    engine.open_get("http://maps.test/orphan", &listener, BufferReply::new());
    entered.recv_timeout(WAIT).unwrap();
    drop(listener);
    transport.release();

    assert!(rx.recv_timeout(QUIET).is_err());
    assert!(wait_until(|| engine.num_pending_requests() == 0));
}

// =============================================================================
// Concurrency
// =============================================================================

/// Fails the test if two callbacks ever overlap.
struct SerialListener {
    inside: AtomicBool,
    overlaps: AtomicUsize,
    delivered: AtomicUsize,
}

impl SerialListener {
    fn enter(&self) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(200));
        self.delivered.fetch_add(1, Ordering::SeqCst);
        self.inside.store(false, Ordering::SeqCst);
    }
}

impl RequestListener for SerialListener {
    fn notify_for_success(&self, _reply: Arc<Reply>) {
        self.enter();
    }

    fn notify_for_failure(&self, _reply: Arc<Reply>) {
        self.enter();
    }
}

#[test]
fn test_concurrent_requests_are_delivered_serially() {
    const REQUESTS: usize = 64;

    let transport = StaggeredTransport::new();
    let engine = Arc::new(engine(
        transport.clone(),
        EngineConfig::default().with_worker_threads(8),
    ));
    let listener = Arc::new(SerialListener {
        inside: AtomicBool::new(false),
        overlaps: AtomicUsize::new(0),
        delivered: AtomicUsize::new(0),
    });

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let listener = Arc::clone(&listener);
            thread::spawn(move || {
                for i in 0..REQUESTS / 4 {
                    let url = format!("http://maps.test/{}/{}", t, i);
                    assert!(engine.open_get(&url, &listener, BufferReply::new()).is_valid());
                }
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }

    assert!(wait_until(|| listener.delivered.load(Ordering::SeqCst) == REQUESTS));
    assert_eq!(listener.overlaps.load(Ordering::SeqCst), 0);
    assert!(
        transport.peak.load(Ordering::SeqCst) > 1,
        "transport calls should overlap across workers"
    );
    assert!(wait_until(|| engine.num_pending_requests() == 0));

    let stats = engine.stats();
    assert_eq!(stats.submitted, REQUESTS as u64);
    assert_eq!(stats.completed, REQUESTS as u64);
}

#[test]
fn test_request_ids_are_unique() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(transport.clone(), EngineConfig::default().with_worker_threads(2));
    let (listener, rx) = Collector::new();

    let ids: Vec<_> = (0..10)
        .map(|i| engine.open_get(&format!("http://maps.test/{}", i), &listener, BufferReply::new()))
        .collect();
    entered.recv_timeout(WAIT).unwrap();
    transport.release();

    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
    assert!(ids.iter().all(|id| id.as_raw() > 0));

    for _ in 0..10 {
        rx.recv_timeout(WAIT).unwrap();
    }
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_shutdown_aborts_pending_and_refuses_new_requests() {
    let (transport, entered) = GatedTransport::new();
    let engine = engine(transport.clone(), EngineConfig::default().with_worker_threads(1));
    let (listener, rx) = Collector::new();

    engine.open_get("http://maps.test/a", &listener, BufferReply::new());
    engine.open_get("http://maps.test/b", &listener, BufferReply::new());
    entered.recv_timeout(WAIT).unwrap();

    // Workers only finish once the in-flight call returns.
    let releaser = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            transport.release();
        })
    };
    engine.shutdown();
    releaser.join().unwrap();

    assert!(engine.is_shut_down());
    assert!(rx.recv_timeout(QUIET).is_err());
    assert_eq!(engine.num_pending_requests(), 0);
    assert_eq!(
        engine.open_get("http://maps.test/late", &listener, BufferReply::new()),
        RequestId::INVALID
    );
}

/// Stops the engine from inside its own completion callback.
struct StoppingListener {
    engine: Mutex<Option<Arc<RestEngine>>>,
    drop_only: bool,
    done: Mutex<mpsc::Sender<()>>,
}

impl StoppingListener {
    fn stop(&self) {
        if let Some(engine) = self.engine.lock().take() {
            if !self.drop_only {
                engine.shutdown();
            }
        }
        let _ = self.done.lock().send(());
    }
}

impl RequestListener for StoppingListener {
    fn notify_for_success(&self, _reply: Arc<Reply>) {
        self.stop();
    }

    fn notify_for_failure(&self, _reply: Arc<Reply>) {
        self.stop();
    }
}

fn stopping_listener(
    engine: &Arc<RestEngine>,
    drop_only: bool,
) -> (Arc<StoppingListener>, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    let listener = Arc::new(StoppingListener {
        engine: Mutex::new(Some(Arc::clone(engine))),
        drop_only,
        done: Mutex::new(tx),
    });
    (listener, rx)
}

#[test]
fn test_shutdown_from_listener_callback() {
    let engine = Arc::new(engine(FixedTransport::ok(b"bye"), EngineConfig::default()));
    let (listener, done) = stopping_listener(&engine, false);

    assert!(engine.open_get("http://maps.test/stop", &listener, BufferReply::new()).is_valid());

    done.recv_timeout(WAIT).expect("callback returns from shutdown");
    assert!(engine.is_shut_down());
    assert!(wait_until(|| engine.num_pending_requests() == 0));
    assert_eq!(engine.stats().completed, 1);
    assert_eq!(
        engine.open_get("http://maps.test/late", &listener, BufferReply::new()),
        RequestId::INVALID
    );
}

#[test]
fn test_last_engine_handle_dropped_in_callback() {
    let (transport, entered) = GatedTransport::new();
    let engine = Arc::new(engine(transport.clone(), EngineConfig::default()));
    let (listener, done) = stopping_listener(&engine, true);
    let weak = Arc::downgrade(&engine);

    assert!(engine.open_get("http://maps.test/stop", &listener, BufferReply::new()).is_valid());
    entered.recv_timeout(WAIT).unwrap();
    // The listener now holds the only handle.
    drop(engine);
    transport.release();

    done.recv_timeout(WAIT).expect("callback returns after dropping the engine");
    assert!(wait_until(|| weak.upgrade().is_none()));
}
