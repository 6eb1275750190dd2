//! Deferred call queue - work that must run on the host thread.
//!
//! The IM engine is single-threaded and not reentrant-safe from foreign
//! threads, so background workers never call it. Instead they enqueue
//! closures here, and the host thread flushes the queue each time it polls
//! the bridge. A closure receives `&mut dyn HostRuntime` from the drainer,
//! which means only the thread that owns the host can ever run one.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use whaletalk_core::HostRuntime;

/// A unit of work destined for the host thread.
pub type DeferredCall = Box<dyn FnOnce(&mut dyn HostRuntime) + Send>;

/// FIFO queue of deferred calls, guarded by a single lock and bounded by
/// an owning lifetime scope.
pub struct DeferredCallQueue {
    pending: Mutex<Vec<DeferredCall>>,
    scope: CancellationToken,
}

impl DeferredCallQueue {
    /// Creates a queue bounded by `scope`; once the scope is cancelled,
    /// drained batches are discarded instead of executed.
    pub fn new(scope: CancellationToken) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            scope,
        }
    }

    /// Appends a call. Never blocks beyond the queue lock and never runs
    /// the closure synchronously.
    pub fn enqueue(&self, call: impl FnOnce(&mut dyn HostRuntime) + Send + 'static) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.push(Box::new(call));
    }

    /// Swaps out the pending batch and, if the scope is still alive, runs
    /// each call in enqueue order on the caller's thread. Returns the
    /// number of calls executed.
    ///
    /// Callers must be running on the host thread; `host` is the proof.
    pub fn drain(&self, host: &mut dyn HostRuntime) -> usize {
        let batch = {
            let mut pending = match self.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *pending)
        };

        if self.scope.is_cancelled() {
            if !batch.is_empty() {
                debug!(discarded = batch.len(), "scope ended, dropping deferred calls");
            }
            return 0;
        }

        let count = batch.len();
        for call in batch {
            call(host);
        }
        if count > 0 {
            trace!(executed = count, "drained deferred calls");
        }
        count
    }

    /// Number of calls waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        match self.pending.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
