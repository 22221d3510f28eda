//! One in-flight or settled async value with an owned subscriber registry.
//!
//! A [`CachePayload`] is created for the first requester of a key and then
//! shared by every later requester. The underlying computation is started
//! exactly once, at construction. When it settles, every subscriber
//! registered up to that point is invoked exactly once, in registration
//! order, on the task that drove the computation.
//!
//! Subscribing after settlement never replays the value; late attachers
//! read the settled value directly via [`CachePayload::value`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Notify;

use crate::diagnostics::CacheDiagnostic;

/// Opaque handle for one registered subscriber.
///
/// Ids are allocated from a per-payload monotonic counter and are never
/// reused, so a stale id can be detected as such rather than silently
/// detaching an unrelated subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

type Subscriber<T> = Arc<dyn Fn(Option<T>) + Send + Sync>;

struct PayloadState<T> {
    /// Keyed by the monotonic id, so iteration order is registration order.
    subscribers: BTreeMap<u64, Subscriber<T>>,
    next_id: u64,
    settled: Option<T>,
}

/// One pending or settled async value, shared by all requesters of its key.
pub struct CachePayload<T> {
    state: Mutex<PayloadState<T>>,
    settlement: Notify,
}

impl<T> CachePayload<T> {
    /// Register a callback to be invoked once when the payload settles,
    /// and again with `None` if the owning cache is cleared.
    ///
    /// Returns a fresh monotonically increasing id. The number of
    /// concurrent subscribers is unbounded.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, Arc::new(callback));
        SubscriptionId(id)
    }

    /// Remove a registration, stopping all future notifications to it.
    ///
    /// An absent id is tolerated: it signals a double-unsubscribe or an
    /// unsubscribe after the registration was already gone, and is
    /// reported as a non-fatal diagnostic. Returns whether a registration
    /// was actually removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock_state().subscribers.remove(&id.0).is_some();
        if !removed {
            tracing::warn!(
                diagnostic = %CacheDiagnostic::UnsubscribeNotFound { id },
                "unsubscribe ignored"
            );
        }
        removed
    }

    /// Whether the computation has completed.
    pub fn is_settled(&self) -> bool {
        self.lock_state().settled.is_some()
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers.len()
    }

    /// Callbacks never run under this lock, so a poisoned mutex only
    /// means some caller panicked between lock and unlock; the state
    /// itself is still coherent.
    fn lock_state(&self) -> MutexGuard<'_, PayloadState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> CachePayload<T>
where
    T: Clone + Send + 'static,
{
    /// Construct a pending payload and start its computation.
    ///
    /// The computation is awaited on a spawned task holding only a weak
    /// reference back to the payload. Dropping every strong reference does
    /// not abort the computation (there is no cancellation), it only turns
    /// the eventual settlement into a no-op.
    ///
    /// A computation that panics settles nothing: the payload stays
    /// pending forever and its subscribers are never invoked.
    pub fn spawn<F>(computation: F) -> Arc<Self>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let payload = Arc::new(Self {
            state: Mutex::new(PayloadState {
                subscribers: BTreeMap::new(),
                next_id: 0,
                settled: None,
            }),
            settlement: Notify::new(),
        });
        let weak: Weak<Self> = Arc::downgrade(&payload);
        tokio::spawn(async move {
            let value = computation.await;
            if let Some(payload) = weak.upgrade() {
                payload.settle(value);
            }
        });
        payload
    }

    /// Invoke every currently registered callback, in registration order.
    ///
    /// `None` signals invalidation on clear. Subscriptions are not
    /// removed. The registry is snapshotted before any callback runs, so
    /// a callback that reentrantly subscribes or unsubscribes affects
    /// later rounds only.
    pub fn notify_subscribers(&self, value: Option<T>) {
        let snapshot: Vec<Subscriber<T>> =
            self.lock_state().subscribers.values().cloned().collect();
        for subscriber in snapshot {
            subscriber(value.clone());
        }
    }

    /// The settled value, if the computation has completed.
    ///
    /// This is how a freshly attaching consumer observes a payload that
    /// settled before it subscribed; the payload itself fires only at
    /// settlement.
    pub fn value(&self) -> Option<T> {
        self.lock_state().settled.clone()
    }

    /// Wait for the payload to settle and return the value.
    ///
    /// By the time this returns, every subscriber registered before
    /// settlement has been invoked.
    pub async fn settled(&self) -> T {
        loop {
            let notified = self.settlement.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a settlement landing
            // between the check and the await is not missed.
            notified.as_mut().enable();
            if let Some(value) = self.value() {
                return value;
            }
            notified.await;
        }
    }

    /// Record the settled value and broadcast it. Runs at most once.
    fn settle(&self, value: T) {
        {
            let mut state = self.lock_state();
            if state.settled.is_some() {
                return;
            }
            state.settled = Some(value.clone());
        }
        self.notify_subscribers(Some(value));
        self.settlement.notify_waiters();
    }
}
