//! Cellar Scope - Lifecycle and Consumer Bindings
//!
//! Wires the `cellar-core` primitives into the shape consumers use:
//!
//! - [`CacheScope`]: owns "the current cache instance" for a subtree of
//!   consumers, with replace-on-clear semantics.
//! - [`ValueBinding`]: one consumer's attach/observe/detach adapter.
//!
//! The capability surface is three operations: [`create_scope`],
//! [`ValueBinding::request`], and [`request_clear`]. Scopes are explicit
//! handles passed by reference at each call site; there is no ambient or
//! global scope lookup.

use std::fmt;

pub mod binding;
pub mod scope;

pub use binding::{resolver, Resolver, ValueBinding, ValueState};
pub use scope::CacheScope;

// Re-export core types for convenience
pub use cellar_core::{Cache, CacheDiagnostic, CacheId, CachePayload, SubscriptionId};

/// Establish a cache scope shared by every consumer holding a clone of
/// the returned handle.
pub fn create_scope<K, T>() -> CacheScope<K, T>
where
    K: Ord + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    CacheScope::new()
}

/// Full invalidation: notifies all live consumers back to loading and
/// replaces the scope's cache, so still-attached consumers trigger fresh
/// resolution on their next request.
pub fn request_clear<K, T>(scope: &CacheScope<K, T>)
where
    K: Ord + fmt::Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    scope.clear();
}
