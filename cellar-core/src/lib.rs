//! Cellar Core - Single-Flight Cache Primitives
//!
//! This crate implements the two building blocks of the cellar cache:
//!
//! - [`CachePayload`]: one in-flight or settled async value, shared by
//!   every requester of its key, broadcasting settlement to an evolving
//!   subscriber set.
//! - [`Cache`]: a key-to-payload store providing single-flight
//!   memoization (`get_or_set`) and bulk invalidation (`clear`).
//!
//! Scope lifecycle management and per-consumer bindings live in
//! `cellar-scope`; this crate has no opinion about who owns a cache or
//! when it is replaced.
//!
//! # Concurrency
//!
//! All mutation happens behind short-lived mutex sections that never span
//! an `.await` and never span a user callback. Notification snapshots the
//! subscriber registry before invoking anything, so a callback may safely
//! re-enter the cache or the payload it is being notified from.

pub mod cache;
pub mod diagnostics;
pub mod payload;

pub use cache::{Cache, CacheId, ClearHook};
pub use diagnostics::CacheDiagnostic;
pub use payload::{CachePayload, SubscriptionId};
