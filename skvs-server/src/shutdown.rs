//! # Cooperative Shutdown
//!
//! One process-wide stop request, observed by workers at loop boundaries.
//!
//! ## Design Principles
//!
//! 1. **Flag First**: The atomic flag is the source of truth; workers check it
//!    before every accept, read and blocked write.
//! 2. **Wake, Don't Poll**: Each worker registers a `mio::Waker`, so a worker
//!    parked in `Poll::poll` sees the request immediately instead of after a
//!    timeout.
//! 3. **Cooperative**: Nothing is interrupted mid-request; a worker finishes
//!    the request it is answering, then notices the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

#[derive(Default)]
struct Inner {
    requested: AtomicBool,
    wakers: Mutex<Vec<Arc<mio::Waker>>>,
}

/// Cloneable handle to the shutdown request.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every registered worker. Idempotent.
    pub fn trigger(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        for waker in self.inner.wakers.lock().iter() {
            if let Err(err) = waker.wake() {
                warn!(error = %err, "failed to wake worker");
            }
        }
    }

    /// True once `trigger` has been called.
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Registers a waker to be fired on `trigger`.
    ///
    /// Workers re-check the flag after registering, so a trigger racing with
    /// registration is not lost.
    pub fn register(&self, waker: Arc<mio::Waker>) {
        self.inner.wakers.lock().push(waker);
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("requested", &self.is_requested())
            .finish()
    }
}
