//! Completion dispatcher.
//!
//! One dedicated thread drains a channel of completion events and runs every
//! sink and listener callback, so callbacks for different requests never
//! overlap even though transport calls finish on many worker threads.
//!
//! Per event the dispatcher:
//!
//! 1. asks the registry whether the request is still live (aborted requests
//!    are dropped here without any callback)
//! 2. feeds the body to `on_data_received` or the error to `on_error`
//! 3. marks the request `Completed`
//! 4. notifies the listener, if it is still registered and alive
//! 5. removes the request from the registry

use super::error::{EngineError, ReplyError};
use super::listener::Reply;
use super::registry::{CompletionTicket, Registry};
use super::types::RequestId;
use crate::transport::TransportResponse;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Event posted to the dispatcher thread.
#[derive(Debug)]
pub enum DispatchEvent {
    /// A request finished, from the network or from the tile cache
    Completed {
        id: RequestId,
        result: Result<TransportResponse, ReplyError>,
        from_cache: bool,
    },
    /// Stop after handling everything posted before this event
    Shutdown,
}

/// Handle to the dispatcher thread.
pub struct CompletionDispatcher {
    sender: Sender<DispatchEvent>,
    handle: Option<JoinHandle<()>>,
}

impl CompletionDispatcher {
    /// Starts the dispatcher thread.
    pub fn spawn(registry: Arc<Registry>) -> Result<Self, EngineError> {
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("maprest-dispatcher".to_string())
            .spawn(move || dispatch_loop(&registry, receiver))
            .map_err(EngineError::Spawn)?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Sender for worker threads and cache hits.
    pub fn sender(&self) -> Sender<DispatchEvent> {
        self.sender.clone()
    }

    /// Posts an event. Returns false if the dispatcher has stopped.
    #[cfg(test)]
    pub fn post(&self, event: DispatchEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Delivers the remaining backlog, then stops the thread and waits for it.
    ///
    /// Called from a listener callback, the dispatcher thread cannot join
    /// itself: the loop stops once the current callback returns and the
    /// thread is left detached. Returns true only if the thread was joined.
    pub fn shutdown(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        let _ = self.sender.send(DispatchEvent::Shutdown);

        if handle.thread().id() == thread::current().id() {
            debug!("Dispatcher shutdown requested from a callback, detaching");
            return false;
        }
        if handle.join().is_err() {
            warn!("Dispatcher thread panicked");
        }
        true
    }
}

impl Drop for CompletionDispatcher {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn dispatch_loop(registry: &Registry, receiver: Receiver<DispatchEvent>) {
    debug!("Dispatcher started");

    // Block for one event, then drain whatever piled up behind it.
    'outer: while let Ok(first) = receiver.recv() {
        let mut handled = 0usize;
        for event in std::iter::once(first).chain(receiver.try_iter()) {
            match event {
                DispatchEvent::Completed {
                    id,
                    result,
                    from_cache,
                } => {
                    deliver(registry, id, result, from_cache);
                    handled += 1;
                }
                DispatchEvent::Shutdown => break 'outer,
            }
        }
        trace!(handled, "Dispatcher drained backlog");
    }

    debug!("Dispatcher stopped");
}

fn deliver(
    registry: &Registry,
    id: RequestId,
    result: Result<TransportResponse, ReplyError>,
    from_cache: bool,
) {
    let (url, mut sink) = match registry.begin_completion(id) {
        CompletionTicket::Deliver { url, sink } => (url, sink),
        CompletionTicket::Suppressed => {
            trace!(request_id = %id, "Dropping result of aborted request");
            return;
        }
        CompletionTicket::Unknown => {
            trace!(request_id = %id, "Dropping result of unknown request");
            return;
        }
    };

    let (reply, success) = match result {
        Ok(response) => {
            let accepted = sink.on_data_received(response.body);
            if !accepted {
                debug!(request_id = %id, url = %url, "Reply sink rejected response body");
            }
            let reply = Reply::success(
                id,
                url,
                response.status,
                response.content_type,
                from_cache,
                accepted,
                sink,
            );
            (reply, true)
        }
        Err(error) => {
            debug!(request_id = %id, url = %url, error = %error, "Request failed");
            sink.on_error(&error);
            (Reply::failure(id, url, error, sink), false)
        }
    };

    if !registry.mark_completed(id, success) {
        // Aborted while the sink was being fed.
        registry.finish(id);
        return;
    }

    // Looked up again so that an unregister during the sink call is honoured.
    let listener = registry.listener_of(id).and_then(|binding| binding.upgrade());
    if let Some(listener) = listener {
        let reply = Arc::new(reply);
        if success {
            listener.notify_for_success(reply);
        } else {
            listener.notify_for_failure(reply);
        }
    }

    registry.finish(id);
    trace!(request_id = %id, success, "Request delivered");
}
