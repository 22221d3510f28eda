//! Key-to-payload store with single-flight memoization and bulk invalidation.
//!
//! At most one [`CachePayload`] exists per key, so any number of
//! concurrent requesters of the same key share one computation.
//!
//! # Clear ordering
//!
//! `clear()` empties the backing store *first*, then notifies from the
//! drained snapshot, then fires the clear-hook. A subscriber callback that
//! reentrantly queries the cache during notification therefore observes an
//! empty (or freshly repopulated) cache, never a partially-cleared one.
//! Notification order across payloads is ascending key order, which is why
//! keys are required to be `Ord`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::payload::CachePayload;

/// Identity of one cache instance.
///
/// UUIDv7, so ids sort by creation time. Scope rotation replaces the whole
/// cache instance rather than emptying it in place; comparing ids is how
/// dependents detect that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(Uuid);

impl CacheId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback fired exactly once at the end of [`Cache::clear`].
pub type ClearHook = Arc<dyn Fn() + Send + Sync>;

/// Single-flight memoization store.
///
/// Entries live until [`clear`](Cache::clear); there is no eviction and no
/// per-key expiry.
pub struct Cache<K, T> {
    id: CacheId,
    entries: Mutex<BTreeMap<K, Arc<CachePayload<T>>>>,
    clear_hook: Mutex<Option<ClearHook>>,
}

impl<K, T> Cache<K, T>
where
    K: Ord + fmt::Debug,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            id: CacheId::new(),
            entries: Mutex::new(BTreeMap::new()),
            clear_hook: Mutex::new(None),
        }
    }

    /// Identity of this instance, stable for its whole lifetime.
    pub fn id(&self) -> CacheId {
        self.id
    }

    /// Return the payload for `key`, invoking `factory` on a miss.
    ///
    /// The factory runs at most once per key per cache lifetime: on a hit
    /// it is not invoked at all, which is what guarantees exactly one
    /// computation start per key. The check-and-insert is atomic under the
    /// store lock; the factory itself runs under that lock and must not
    /// call back into this cache.
    pub fn get_or_set<F>(&self, key: K, factory: F) -> Arc<CachePayload<T>>
    where
        F: FnOnce() -> Arc<CachePayload<T>>,
    {
        let mut entries = self.lock_entries();
        match entries.entry(key) {
            Entry::Occupied(occupied) => {
                tracing::debug!(cache_id = %self.id, key = ?occupied.key(), "cache hit");
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(cache_id = %self.id, key = ?vacant.key(), "cache miss");
                Arc::clone(vacant.insert(factory()))
            }
        }
    }

    /// Store `payload` under `key`, overwriting any existing entry.
    pub fn set(&self, key: K, payload: Arc<CachePayload<T>>) {
        self.lock_entries().insert(key, payload);
    }

    /// Invalidate everything.
    ///
    /// Empties the backing store, notifies every drained payload's
    /// subscribers with `None` (ascending key order), then fires the
    /// clear-hook exactly once, if one is installed.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.lock_entries());
        tracing::debug!(cache_id = %self.id, entries = drained.len(), "clearing cache");
        for payload in drained.values() {
            payload.notify_subscribers(None);
        }
        let hook = self.lock_hook().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Install or replace the single clear-hook; `None` removes it.
    pub fn on_clear(&self, hook: Option<ClearHook>) {
        *self.lock_hook() = hook;
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> MutexGuard<'_, BTreeMap<K, Arc<CachePayload<T>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Held only to read or replace the hook, never while invoking it.
    fn lock_hook(&self) -> MutexGuard<'_, Option<ClearHook>> {
        self.clear_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, T> Default for Cache<K, T>
where
    K: Ord + fmt::Debug,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
