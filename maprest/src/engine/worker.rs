//! Fixed-size worker pool running blocking transport calls.
//!
//! # Architecture
//!
//! ```text
//! open_request ──push──▶ WorkQueue ──pop──▶ worker-0..N ──execute──▶ Transport
//!                            ▲                  │
//!      abort (queued) ──remove                  └──send──▶ dispatcher channel
//! ```
//!
//! Workers never call listeners. Each one claims a single queued request,
//! runs it through the transport and posts the outcome to the dispatcher.

use super::dispatcher::DispatchEvent;
use super::error::{EngineError, ReplyError};
use super::registry::Registry;
use super::types::RequestId;
use crate::transport::{
    CommunicationError, ErrorCategory, Transport, TransportRequest, TransportResponse,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Granularity at which a retry backoff notices an abort.
const RETRY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// FIFO of queued request ids.
///
/// Unlike a channel, entries can be removed again, which is what makes
/// cancelling unstarted work synchronous.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    items: VecDeque<RequestId>,
    closed: bool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends an id. Returns false once the queue is closed.
    pub fn push(&self, id: RequestId) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.items.push_back(id);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Blocks until an id is available; `None` once closed.
    pub fn pop(&self) -> Option<RequestId> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(id) = state.items.pop_front() {
                return Some(id);
            }
            self.available.wait(&mut state);
        }
    }

    /// Removes an id that has not been picked up yet.
    pub fn remove(&self, id: RequestId) -> bool {
        let mut state = self.state.lock();
        match state.items.iter().position(|queued| *queued == id) {
            Some(pos) => {
                state.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes several ids at once.
    pub fn remove_all(&self, ids: &[RequestId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.retain(|queued| !ids.contains(queued));
        before - state.items.len()
    }

    /// Wakes every worker and refuses further pushes.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.available.notify_all();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry behaviour for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure (0 disables retries)
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
    };

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Everything a worker thread needs.
struct WorkerContext {
    queue: Arc<WorkQueue>,
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    events: Sender<DispatchEvent>,
    retry: RetryPolicy,
}

/// Handle to the running worker threads.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers pulling from `queue`.
    pub fn spawn(
        threads: usize,
        queue: Arc<WorkQueue>,
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        events: Sender<DispatchEvent>,
        retry: RetryPolicy,
    ) -> Result<Self, EngineError> {
        let mut handles = Vec::with_capacity(threads);

        for i in 0..threads {
            let context = WorkerContext {
                queue: Arc::clone(&queue),
                registry: Arc::clone(&registry),
                transport: Arc::clone(&transport),
                events: events.clone(),
                retry,
            };

            let spawned = thread::Builder::new()
                .name(format!("maprest-worker-{}", i))
                .spawn(move || worker_loop(context));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Let the already-started workers exit before reporting.
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(EngineError::Spawn(e));
                }
            }
        }

        debug!(threads, "Worker pool started");
        Ok(Self { handles })
    }

    /// Waits for every worker to exit. The queue must be closed first.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

fn worker_loop(context: WorkerContext) {
    while let Some(id) = context.queue.pop() {
        // Aborted between enqueue and pop, or never queued.
        let Some(claimed) = context.registry.claim(id) else {
            trace!(request_id = %id, "Skipping request that is no longer queued");
            continue;
        };

        trace!(request_id = %id, url = %claimed.request.url, "Worker executing request");
        let result = execute_with_retry(
            context.transport.as_ref(),
            &claimed.request,
            &claimed.cancel,
            context.retry,
        );

        let event = DispatchEvent::Completed {
            id,
            result: result.map_err(ReplyError::from),
            from_cache: false,
        };
        if context.events.send(event).is_err() {
            warn!(request_id = %id, "Dispatcher gone, worker exiting");
            break;
        }
    }
    trace!("Worker exiting");
}

fn execute_with_retry(
    transport: &dyn Transport,
    request: &TransportRequest,
    cancel: &CancellationToken,
    retry: RetryPolicy,
) -> Result<TransportResponse, CommunicationError> {
    let mut attempt = 0;
    loop {
        let result = transport.execute(request);
        match result {
            Err(ref e) if e.is_transient() && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                debug!(
                    url = %request.url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying transient failure"
                );
                if !sleep_unless_cancelled(delay, cancel) {
                    return Err(CommunicationError::new(
                        ErrorCategory::Cancelled,
                        format!("aborted before retrying {}", request.url),
                    ));
                }
                attempt += 1;
            }
            _ => return result,
        }
    }
}

/// Sleeps for `delay` in short slices. Returns false as soon as `cancel` fires.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(RETRY_POLL_INTERVAL));
    }
}
