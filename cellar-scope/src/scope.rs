//! Scope lifecycle: replace-on-clear ownership of the current cache.
//!
//! A [`CacheScope`] holds "the current cache instance" for some subtree of
//! consumers. Clearing does not empty that instance in place: the cache's
//! clear-hook rotates the scope onto a freshly constructed, empty cache.
//! Replacing the whole instance turns "clear" into an observable state
//! transition; any dependent keyed on the cache identity re-runs its
//! subscription logic against the new instance instead of relying on an
//! invisible side effect.
//!
//! Exactly one clear-hook is wired at any time, always on the currently
//! exposed cache: rotation installs the hook on the new instance and
//! removes it from the old one.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use cellar_core::Cache;

struct ScopeInner<K, T> {
    current: Mutex<Arc<Cache<K, T>>>,
}

/// Handle to a logical scope owning the current cache instance.
///
/// Cloning the handle shares the scope; all clones observe the same
/// rotations. The scope lives for as long as any handle does and has no
/// terminal state.
pub struct CacheScope<K, T> {
    inner: Arc<ScopeInner<K, T>>,
}

impl<K, T> Clone for CacheScope<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> CacheScope<K, T>
where
    K: Ord + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Establish a scope around a fresh, empty cache.
    pub fn new() -> Self {
        let scope = Self {
            inner: Arc::new(ScopeInner {
                current: Mutex::new(Arc::new(Cache::new())),
            }),
        };
        scope.wire_hook(&scope.current());
        scope
    }

    /// The currently exposed cache instance.
    ///
    /// Dependents must re-resolve this handle rather than hold on to a
    /// previous instance; after a clear it refers to a different, empty
    /// cache.
    pub fn current(&self) -> Arc<Cache<K, T>> {
        Arc::clone(&self.lock_current())
    }

    /// Full invalidation of the scope's cache.
    ///
    /// Every live subscriber across every payload is notified with `None`,
    /// then the clear-hook rotates the scope onto a new empty instance.
    pub fn clear(&self) {
        self.current().clear();
    }

    /// Install this scope's rotation hook on `cache`.
    ///
    /// The hook holds only a weak reference; a cache that outlives every
    /// scope handle clears without rotating anything.
    fn wire_hook(&self, cache: &Arc<Cache<K, T>>) {
        let weak: Weak<ScopeInner<K, T>> = Arc::downgrade(&self.inner);
        cache.on_clear(Some(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                CacheScope { inner }.rotate();
            }
        })));
    }

    /// Transition `Active(cache)` to `Active(new_cache)`.
    ///
    /// Runs from the old cache's clear-hook, after its store was emptied
    /// and its subscribers notified.
    fn rotate(&self) {
        let fresh = Arc::new(Cache::new());
        self.wire_hook(&fresh);
        let old = std::mem::replace(&mut *self.lock_current(), Arc::clone(&fresh));
        // The retired instance must not rotate the scope a second time.
        old.on_clear(None);
        tracing::info!(
            old_cache_id = %old.id(),
            new_cache_id = %fresh.id(),
            "cache scope rotated"
        );
    }

    fn lock_current(&self) -> MutexGuard<'_, Arc<Cache<K, T>>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, T> Default for CacheScope<K, T>
where
    K: Ord + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_test_utils::pending_payload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_clear_replaces_cache_instance() {
        let scope: CacheScope<&str, String> = CacheScope::new();
        let before = scope.current();
        scope.clear();
        let after = scope.current();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_ne!(before.id(), after.id());
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_old_instance_hook_is_detached() {
        let scope: CacheScope<&str, String> = CacheScope::new();
        let old = scope.current();
        scope.clear();
        let current = scope.current();

        // Clearing the retired instance again must not rotate the scope.
        old.clear();
        assert!(Arc::ptr_eq(&current, &scope.current()));
    }

    #[tokio::test]
    async fn test_clear_notifies_subscribers_before_rotation_completes() {
        let scope: CacheScope<&str, String> = CacheScope::new();
        let cache = scope.current();
        let payload = cache.get_or_set("test", pending_payload);

        let invalidations = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&invalidations);
        payload.subscribe(move |value| {
            assert!(value.is_none());
            counted.fetch_add(1, Ordering::SeqCst);
        });

        scope.clear();
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_clones_share_rotation() {
        let scope: CacheScope<&str, String> = CacheScope::new();
        let sibling = scope.clone();
        scope.clear();
        assert!(Arc::ptr_eq(&scope.current(), &sibling.current()));
    }

    #[tokio::test]
    async fn test_repeated_clears_keep_rotating() {
        let scope: CacheScope<&str, String> = CacheScope::new();
        let first = scope.current().id();
        scope.clear();
        let second = scope.current().id();
        scope.clear();
        let third = scope.current().id();

        assert_ne!(first, second);
        assert_ne!(second, third);
    }
}
