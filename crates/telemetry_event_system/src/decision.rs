//! # Decision cache
//!
//! [`HandlerCache`] holds deferred callbacks until an asynchronous yes/no
//! decision arrives (for example "may session replay start recording?").
//! Callbacks settled before the decision are queued; a `true` decision runs
//! them in order, a `false` decision drops them. If nobody decides within the
//! timeout the cache decides `false` on its own, so queued work cannot linger.
//! The deadline is checked on every access, so this holds even when no tokio
//! runtime is around to run the timer.
//!
//! The cache is independent of the emitter tree.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// Time after which an undecided cache discards its queue.
pub const DECISION_TIMEOUT: Duration = Duration::from_millis(5000);

type DeferredHandler = Box<dyn FnOnce() + Send>;

struct CacheState {
    handlers: Vec<DeferredHandler>,
    decision: Option<bool>,
    locked: bool,
    deadline: Instant,
    timer: Option<AbortHandle>,
}

impl CacheState {
    fn new(timeout: Duration) -> Self {
        Self {
            handlers: Vec::new(),
            decision: None,
            locked: false,
            deadline: Instant::now() + timeout,
            timer: None,
        }
    }

    /// Decides `false` if the deadline passed while undecided.
    fn expire_if_due(&mut self) {
        if self.decision.is_some() || Instant::now() < self.deadline {
            return;
        }
        debug!(
            "⏱️ Handler cache timed out without a decision; dropping {} handlers",
            self.handlers.len()
        );
        self.decision = Some(false);
        self.handlers.clear();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Deferred-callback buffer gated by a later boolean decision.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct HandlerCache {
    inner: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for HandlerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HandlerCache")
            .field("decision", &state.decision)
            .field("locked", &state.locked)
            .field("pending", &state.handlers.len())
            .finish()
    }
}

impl HandlerCache {
    /// Creates a cache that decides `false` after [`DECISION_TIMEOUT`].
    pub fn new() -> Self {
        Self::with_timeout(DECISION_TIMEOUT)
    }

    /// Creates a cache with a custom auto-decision timeout.
    ///
    /// The deadline is fixed here. On a tokio runtime a timer task also frees
    /// the queue as soon as it passes; without one the queue is dropped on
    /// the next call that touches the cache.
    pub fn with_timeout(timeout: Duration) -> Self {
        let cache = Self {
            inner: Arc::new(Mutex::new(CacheState::new(timeout))),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let weak: Weak<Mutex<CacheState>> = Arc::downgrade(&cache.inner);
                let task = runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(inner) = weak.upgrade() {
                        HandlerCache { inner }.expire();
                    }
                });
                cache.lock().timer = Some(task.abort_handle());
            }
            Err(_) => debug!("⏱️ No tokio runtime; handler cache deadline checked on access"),
        }
        cache
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        let mut state = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.expire_if_due();
        state
    }

    /// Runs `handler` now, queues it, or drops it, depending on the decision.
    pub fn settle<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        let decision = state.decision;
        match decision {
            Some(false) => {}
            None => state.handlers.push(Box::new(handler)),
            Some(true) => {
                drop(state);
                handler();
            }
        }
    }

    /// Records the decision. Ignored once the cache has been locked.
    ///
    /// `true` runs every queued handler in queue order; `false` drops them.
    /// Either way the queue is cleared and the timeout cancelled.
    pub fn decide(&self, decision: bool) {
        let queued = {
            let mut state = self.lock();
            if state.locked {
                return;
            }
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.decision = Some(decision);
            std::mem::take(&mut state.handlers)
        };

        if decision {
            debug!("✅ Handler cache decided true; running {} handlers", queued.len());
            for handler in queued {
                handler();
            }
        } else {
            debug!("🚫 Handler cache decided false; dropping {} handlers", queued.len());
        }
    }

    /// Decides and then locks the cache against further decisions.
    pub fn permanently_decide(&self, decision: bool) {
        self.decide(decision);
        self.lock().locked = true;
    }

    /// Current decision, if any.
    pub fn decision(&self) -> Option<bool> {
        self.lock().decision
    }

    /// Number of handlers waiting for a decision.
    pub fn pending(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Timer path. Taking the lock applies the deadline.
    fn expire(&self) {
        drop(self.lock());
    }
}

impl Default for HandlerCache {
    fn default() -> Self {
        Self::new()
    }
}
