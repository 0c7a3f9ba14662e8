//! Registry of outstanding requests.
//!
//! Maps each [`RequestId`] to its listener binding, reply sink and status.
//! All mutations happen under one mutex, held only for the map edit itself:
//! never across a transport call and never across a listener callback.
//!
//! An entry leaves the registry only once its terminal notification has been
//! delivered (or suppressed, for aborted requests), so [`Registry::len`]
//! always equals the number of requests an observer could still hear about.

use super::error::EngineError;
use super::listener::{ListenerBinding, ListenerKey, ReplySink};
use super::types::{RequestId, RequestIdGenerator, RequestStatus};
use crate::transport::TransportRequest;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// One outstanding or queued request.
struct RequestEntry {
    request: TransportRequest,
    status: RequestStatus,
    listener: Option<ListenerBinding>,
    /// Taken by the dispatcher when the result is delivered.
    sink: Option<Box<dyn ReplySink>>,
    cancel: CancellationToken,
    created_at: Instant,
}

/// What happened to a request when it was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    /// No such request in the registry
    NotFound,
    /// The request had not started; it is gone and nothing will be reported
    Removed,
    /// The request is in flight; its result will be discarded on arrival
    Flagged,
    /// The request was already completed or aborted
    AlreadyTerminal,
}

/// Ids touched by a bulk abort.
#[derive(Debug, Default)]
pub struct BulkAbort {
    /// Requests removed before reaching a worker; they must be dequeued
    pub removed: Vec<RequestId>,
    /// Requests flagged while in flight
    pub flagged: Vec<RequestId>,
}

impl BulkAbort {
    pub fn total(&self) -> usize {
        self.removed.len() + self.flagged.len()
    }
}

/// Work claimed by a worker thread.
pub struct ClaimedRequest {
    pub request: TransportRequest,
    pub cancel: CancellationToken,
}

/// Decision taken by the dispatcher when a completion event arrives.
pub enum CompletionTicket {
    /// The id is unknown (already finished or removed)
    Unknown,
    /// The request was aborted; the event is dropped
    Suppressed,
    /// Deliver the result to the sink and the listener
    Deliver {
        url: String,
        sink: Box<dyn ReplySink>,
    },
}

/// Point-in-time view of one request, for diagnostics.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub id: RequestId,
    pub url: String,
    pub status: RequestStatus,
    pub has_listener: bool,
    pub age: Duration,
}

/// Lifetime counters of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Requests accepted into the registry
    pub submitted: u64,
    /// Requests delivered on the success path
    pub completed: u64,
    /// Requests delivered on the failure path
    pub failed: u64,
    /// Requests aborted before delivery
    pub aborted: u64,
    /// Requests refused because the registry was full
    pub rejected: u64,
}

/// Thread-safe request registry.
pub struct Registry {
    entries: Mutex<HashMap<RequestId, RequestEntry>>,
    ids: RequestIdGenerator,
    max_pending: usize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    rejected: AtomicU64,
}

impl Registry {
    /// Creates an empty registry holding at most `max_pending` requests.
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ids: RequestIdGenerator::new(),
            max_pending,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Registers a new request in `Created` state.
    ///
    /// Fails with [`EngineError::MaxRequestsExceeded`] when the registry is
    /// full; the sink is dropped in that case.
    pub fn register(
        &self,
        request: TransportRequest,
        listener: Option<ListenerBinding>,
        sink: Box<dyn ReplySink>,
    ) -> Result<RequestId, EngineError> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_pending {
            drop(entries);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                url = %request.url,
                limit = self.max_pending,
                "Rejecting request, too many pending"
            );
            return Err(EngineError::MaxRequestsExceeded {
                limit: self.max_pending,
            });
        }

        let id = self.ids.next_id();
        tracing::trace!(request_id = %id, url = %request.url, "Registered request");
        entries.insert(
            id,
            RequestEntry {
                request,
                status: RequestStatus::Created,
                listener,
                sink: Some(sink),
                cancel: CancellationToken::new(),
                created_at: Instant::now(),
            },
        );
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Moves a request to `next` if that is a legal forward transition.
    ///
    /// Returns false if the request is unknown or the transition is illegal.
    pub fn advance(&self, id: RequestId, next: RequestStatus) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&id) {
            Some(entry) if entry.status.can_advance_to(next) => {
                entry.status = next;
                true
            }
            _ => false,
        }
    }

    /// Claims a queued request for a worker, moving it to `InFlight`.
    pub fn claim(&self, id: RequestId) -> Option<ClaimedRequest> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&id)?;
        if entry.status != RequestStatus::Queued {
            return None;
        }
        entry.status = RequestStatus::InFlight;
        Some(ClaimedRequest {
            request: entry.request.clone(),
            cancel: entry.cancel.clone(),
        })
    }

    /// Aborts one request.
    ///
    /// Unstarted requests are removed immediately. In-flight requests are
    /// flagged and their token cancelled; the dispatcher removes them when
    /// the worker reports back.
    pub fn abort(&self, id: RequestId) -> AbortOutcome {
        let mut entries = self.entries.lock();
        let outcome = match entries.get_mut(&id) {
            None => AbortOutcome::NotFound,
            Some(entry) => Self::abort_entry(entry),
        };
        if outcome == AbortOutcome::Removed {
            entries.remove(&id);
        }
        drop(entries);

        if matches!(outcome, AbortOutcome::Removed | AbortOutcome::Flagged) {
            self.aborted.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    fn abort_entry(entry: &mut RequestEntry) -> AbortOutcome {
        match entry.status {
            RequestStatus::Created | RequestStatus::Queued => {
                entry.status = RequestStatus::Aborted;
                entry.cancel.cancel();
                AbortOutcome::Removed
            }
            RequestStatus::InFlight => {
                entry.status = RequestStatus::Aborted;
                entry.cancel.cancel();
                AbortOutcome::Flagged
            }
            RequestStatus::Completed | RequestStatus::Aborted => AbortOutcome::AlreadyTerminal,
        }
    }

    /// Aborts every request matching `filter`.
    fn abort_matching<F>(&self, filter: F) -> BulkAbort
    where
        F: Fn(&RequestEntry) -> bool,
    {
        let mut result = BulkAbort::default();
        let mut entries = self.entries.lock();

        for (id, entry) in entries.iter_mut().filter(|(_, e)| filter(e)) {
            match Self::abort_entry(entry) {
                AbortOutcome::Removed => result.removed.push(*id),
                AbortOutcome::Flagged => result.flagged.push(*id),
                _ => {}
            }
        }
        for id in &result.removed {
            entries.remove(id);
        }
        drop(entries);

        self.aborted
            .fetch_add(result.total() as u64, Ordering::Relaxed);
        result
    }

    /// Aborts every request bound to the given listener.
    pub fn abort_listener(&self, key: ListenerKey) -> BulkAbort {
        self.abort_matching(|entry| {
            entry
                .listener
                .as_ref()
                .is_some_and(|binding| binding.key() == key)
        })
    }

    /// Aborts every request.
    pub fn abort_all(&self) -> BulkAbort {
        self.abort_matching(|_| true)
    }

    /// Detaches a listener from all its requests without aborting them.
    ///
    /// Returns the number of requests that were detached.
    pub fn unregister_listener(&self, key: ListenerKey) -> usize {
        let mut entries = self.entries.lock();
        let mut detached = 0;
        for entry in entries.values_mut() {
            if entry.listener.as_ref().is_some_and(|b| b.key() == key) {
                entry.listener = None;
                detached += 1;
            }
        }
        detached
    }

    /// Decides what to do with a completion event.
    ///
    /// Aborted requests are removed here. For live requests the sink is
    /// handed out; the entry stays until [`finish`]
    /// so that the pending count still covers it during delivery.
    ///
    /// [`finish`]: Registry::finish
    pub fn begin_completion(&self, id: RequestId) -> CompletionTicket {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return CompletionTicket::Unknown;
        };

        match (entry.status, entry.sink.take()) {
            (RequestStatus::InFlight, Some(sink)) => CompletionTicket::Deliver {
                url: entry.request.url.clone(),
                sink,
            },
            (RequestStatus::Aborted, _) => {
                entries.remove(&id);
                CompletionTicket::Suppressed
            }
            (_, sink) => {
                // Sink already taken or request never started; leave it alone.
                entry.sink = sink;
                CompletionTicket::Unknown
            }
        }
    }

    /// Marks a delivered request `Completed`.
    ///
    /// Returns false if it was aborted while its sink was being fed, in
    /// which case the listener must not be notified. Success and failure
    /// counters are updated here.
    pub fn mark_completed(&self, id: RequestId, success: bool) -> bool {
        let marked = self.advance(id, RequestStatus::Completed);
        if marked {
            let counter = if success {
                &self.completed
            } else {
                &self.failed
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        marked
    }

    /// Returns the current listener binding of a request.
    ///
    /// Read again after the sink is fed so that a listener unregistered in
    /// the meantime is not notified.
    pub fn listener_of(&self, id: RequestId) -> Option<ListenerBinding> {
        self.entries.lock().get(&id).and_then(|e| e.listener.clone())
    }

    /// Removes a finished request.
    pub fn finish(&self, id: RequestId) {
        self.entries.lock().remove(&id);
    }

    /// Number of requests still in the registry.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self, id: RequestId) -> Option<RequestStatus> {
        self.entries.lock().get(&id).map(|e| e.status)
    }

    /// Snapshot of all outstanding requests, oldest first.
    pub fn snapshot(&self) -> Vec<RequestInfo> {
        let entries = self.entries.lock();
        let mut infos: Vec<RequestInfo> = entries
            .iter()
            .map(|(id, e)| RequestInfo {
                id: *id,
                url: e.request.url.clone(),
                status: e.status,
                has_listener: e.listener.is_some(),
                age: e.created_at.elapsed(),
            })
            .collect();
        drop(entries);
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::listener::{BufferReply, Reply, RequestListener};
    use std::sync::Arc;

    struct NullListener;

    impl RequestListener for NullListener {
        fn notify_for_success(&self, _reply: Arc<Reply>) {}
        fn notify_for_failure(&self, _reply: Arc<Reply>) {}
    }

    fn register(registry: &Registry, listener: Option<ListenerBinding>) -> RequestId {
        registry
            .register(
                TransportRequest::get("http://x/tile/1"),
                listener,
                Box::new(BufferReply::new()),
            )
            .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration and capacity
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn registry_register_assigns_increasing_ids() {
        let registry = Registry::new(8);
        let a = register(&registry, None);
        let b = register(&registry, None);

        assert!(a.is_valid());
        assert!(b > a);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.status(a), Some(RequestStatus::Created));
    }

    #[test]
    fn registry_rejects_when_full() {
        let registry = Registry::new(2);
        register(&registry, None);
        register(&registry, None);

        let result = registry.register(
            TransportRequest::get("http://x/3"),
            None,
            Box::new(BufferReply::new()),
        );

        assert!(matches!(
            result,
            Err(EngineError::MaxRequestsExceeded { limit: 2 })
        ));
        assert_eq!(registry.stats().rejected, 1);
        assert_eq!(registry.len(), 2);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status transitions
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn registry_claim_requires_queued() {
        let registry = Registry::new(8);
        let id = register(&registry, None);

        assert!(registry.claim(id).is_none(), "Created cannot be claimed");

        assert!(registry.advance(id, RequestStatus::Queued));
        assert!(registry.claim(id).is_some());
        assert_eq!(registry.status(id), Some(RequestStatus::InFlight));
        assert!(registry.claim(id).is_none(), "cannot claim twice");
    }

    #[test]
    fn registry_advance_rejects_backward() {
        let registry = Registry::new(8);
        let id = register(&registry, None);
        registry.advance(id, RequestStatus::Queued);
        registry.claim(id);

        assert!(!registry.advance(id, RequestStatus::Queued));
        assert_eq!(registry.status(id), Some(RequestStatus::InFlight));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Abort
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn registry_abort_queued_removes_entry() {
        let registry = Registry::new(8);
        let id = register(&registry, None);
        registry.advance(id, RequestStatus::Queued);

        assert_eq!(registry.abort(id), AbortOutcome::Removed);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.stats().aborted, 1);
    }

    #[test]
    fn registry_abort_in_flight_flags_entry() {
        let registry = Registry::new(8);
        let id = register(&registry, None);
        registry.advance(id, RequestStatus::Queued);
        let claimed = registry.claim(id).unwrap();

        assert_eq!(registry.abort(id), AbortOutcome::Flagged);
        assert!(claimed.cancel.is_cancelled());
        assert_eq!(registry.status(id), Some(RequestStatus::Aborted));
        assert_eq!(registry.len(), 1, "stays until the completion arrives");

        assert!(matches!(
            registry.begin_completion(id),
            CompletionTicket::Suppressed
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registry_abort_unknown_is_not_found() {
        let registry = Registry::new(8);
        assert_eq!(
            registry.abort(RequestId::from_raw(99)),
            AbortOutcome::NotFound
        );
    }

    #[test]
    fn registry_abort_listener_only_touches_that_listener() {
        let registry = Registry::new(8);
        let first = Arc::new(NullListener);
        let second = Arc::new(NullListener);

        let a = register(&registry, Some(ListenerBinding::new(&first)));
        let b = register(&registry, Some(ListenerBinding::new(&first)));
        let c = register(&registry, Some(ListenerBinding::new(&second)));
        for id in [a, b, c] {
            registry.advance(id, RequestStatus::Queued);
        }
        registry.claim(b);

        let result = registry.abort_listener(ListenerKey::of(&*first));

        assert_eq!(result.removed, vec![a]);
        assert_eq!(result.flagged, vec![b]);
        assert_eq!(registry.status(c), Some(RequestStatus::Queued));
    }

    #[test]
    fn registry_abort_all() {
        let registry = Registry::new(8);
        for _ in 0..3 {
            let id = register(&registry, None);
            registry.advance(id, RequestStatus::Queued);
        }

        let result = registry.abort_all();
        assert_eq!(result.removed.len(), 3);
        assert!(registry.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Completion
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn registry_completion_hands_out_sink_once() {
        let registry = Registry::new(8);
        let id = register(&registry, None);
        registry.advance(id, RequestStatus::Queued);
        registry.claim(id);

        assert!(matches!(
            registry.begin_completion(id),
            CompletionTicket::Deliver { .. }
        ));
        assert!(matches!(
            registry.begin_completion(id),
            CompletionTicket::Unknown
        ));
        assert_eq!(registry.len(), 1);

        assert!(registry.mark_completed(id, true));
        registry.finish(id);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().completed, 1);
    }

    #[test]
    fn registry_mark_completed_fails_after_abort() {
        let registry = Registry::new(8);
        let id = register(&registry, None);
        registry.advance(id, RequestStatus::Queued);
        registry.claim(id);
        let _ticket = registry.begin_completion(id);

        registry.abort(id);

        assert!(!registry.mark_completed(id, true));
        assert_eq!(registry.stats().completed, 0);
    }

    #[test]
    fn registry_unregister_listener_detaches() {
        let registry = Registry::new(8);
        let listener = Arc::new(NullListener);
        let id = register(&registry, Some(ListenerBinding::new(&listener)));

        assert_eq!(registry.unregister_listener(ListenerKey::of(&*listener)), 1);
        assert!(registry.listener_of(id).is_none());
        assert_eq!(registry.status(id), Some(RequestStatus::Created));
    }

    #[test]
    fn registry_snapshot_is_sorted() {
        let registry = Registry::new(8);
        let a = register(&registry, None);
        let b = register(&registry, None);

        let ids: Vec<_> = registry.snapshot().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a, b]);
    }
}
