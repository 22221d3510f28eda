//! Per-consumer binding: attach, observe, detach.
//!
//! A [`ValueBinding`] adapts one consumer to the cache. It requests a
//! value by key and resolver, subscribes for settlement and invalidation,
//! exposes a loading/value snapshot, and unsubscribes on identity change
//! and on drop.
//!
//! Identity is the triple (cache instance, key, resolver pointer). A
//! request against the same triple is a cheap snapshot read; changing any
//! part of the triple detaches the old subscription and re-runs the
//! subscribe logic. After a scope clear, the cache identity has changed,
//! which is exactly what forces still-attached consumers to re-resolve
//! against the fresh instance.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use cellar_core::{Cache, CacheDiagnostic, CacheId, CachePayload, SubscriptionId};

use crate::scope::CacheScope;

/// Type-erased async resolver, invoked once per cache miss.
///
/// The `Arc` pointer is the resolver's identity: passing a different
/// allocation is treated as a new request even for the same key.
pub type Resolver<T> = Arc<dyn Fn() -> BoxFuture<'static, T> + Send + Sync>;

/// Build a [`Resolver`] from an async closure.
pub fn resolver<T, F, Fut>(f: F) -> Resolver<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// What a consumer renders: loading until a value is locally observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueState<T> {
    /// True iff no value is locally observed.
    pub loading: bool,
    pub value: Option<T>,
}

struct Bound<K, T> {
    cache_id: CacheId,
    key: K,
    resolver: Resolver<T>,
    payload: Arc<CachePayload<T>>,
    subscription: SubscriptionId,
}

/// One consumer's live attachment to the cache.
pub struct ValueBinding<K, T> {
    observed: Arc<Mutex<Option<T>>>,
    bound: Option<Bound<K, T>>,
}

impl<K, T> ValueBinding<K, T>
where
    K: Ord + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            observed: Arc::new(Mutex::new(None)),
            bound: None,
        }
    }

    /// Request the value for `key`, sharing any in-flight or settled
    /// computation with every other consumer of the same key in `scope`.
    ///
    /// With no scope, the request degrades to permanent loading: a
    /// diagnostic is logged, any previous subscription is detached, and no
    /// new one is created.
    pub fn request(
        &mut self,
        scope: Option<&CacheScope<K, T>>,
        key: K,
        resolver: Resolver<T>,
    ) -> ValueState<T> {
        let Some(scope) = scope else {
            tracing::warn!(
                diagnostic = %CacheDiagnostic::ScopeMissing,
                key = ?key,
                "value requested outside any cache scope"
            );
            self.detach();
            return ValueState {
                loading: true,
                value: None,
            };
        };
        let cache = scope.current();
        if let Some(bound) = &self.bound {
            if bound.cache_id == cache.id()
                && bound.key == key
                && Arc::ptr_eq(&bound.resolver, &resolver)
            {
                return self.snapshot();
            }
        }
        self.detach();
        self.attach(&cache, key, resolver);
        self.snapshot()
    }

    /// The current loading/value view. `loading` is true iff no value is
    /// locally observed.
    pub fn snapshot(&self) -> ValueState<T> {
        let value = self.lock_observed().clone();
        ValueState {
            loading: value.is_none(),
            value,
        }
    }

    /// Unsubscribe from the bound payload, if any.
    ///
    /// Runs on identity change and on drop. An already-gone registration
    /// is reported by the payload as a diagnostic, not an error.
    pub fn detach(&mut self) {
        if let Some(bound) = self.bound.take() {
            bound.payload.unsubscribe(bound.subscription);
        }
    }

    /// Wait until the bound payload settles, then snapshot.
    ///
    /// Returns `None` when nothing is bound (scope missing). A payload
    /// whose computation never settles waits forever, mirroring the
    /// permanent-loading degradation.
    pub async fn wait_ready(&self) -> Option<ValueState<T>> {
        let payload = Arc::clone(&self.bound.as_ref()?.payload);
        payload.settled().await;
        Some(self.snapshot())
    }

    fn attach(&mut self, cache: &Arc<Cache<K, T>>, key: K, resolver: Resolver<T>) {
        let observed = Arc::clone(&self.observed);
        let factory_resolver = Arc::clone(&resolver);
        let payload = cache.get_or_set(key.clone(), || {
            // A brand-new payload puts this consumer into loading even if
            // a stale locally observed value existed.
            *observed.lock().unwrap_or_else(PoisonError::into_inner) = None;
            CachePayload::spawn((*factory_resolver)())
        });

        let observed = Arc::clone(&self.observed);
        let subscription = payload.subscribe(move |value| {
            *observed.lock().unwrap_or_else(PoisonError::into_inner) = value;
        });
        // The payload never replays a settlement that happened before this
        // consumer attached; read the settled contents directly.
        if let Some(value) = payload.value() {
            *self.lock_observed() = Some(value);
        }

        self.bound = Some(Bound {
            cache_id: cache.id(),
            key,
            resolver,
            payload,
            subscription,
        });
    }

    fn lock_observed(&self) -> MutexGuard<'_, Option<T>> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, T> Default for ValueBinding<K, T>
where
    K: Ord + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Drop for ValueBinding<K, T> {
    fn drop(&mut self) {
        if let Some(bound) = self.bound.take() {
            bound.payload.unsubscribe(bound.subscription);
        }
    }
}
