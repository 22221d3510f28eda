//! Cellar Test Utilities
//!
//! Centralized test fixtures for the cellar workspace:
//! - Payload fixtures with manually driven or never-arriving settlement
//! - Counting resolvers that make fetch deduplication observable

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use cellar_core::CachePayload;
use cellar_scope::{resolver, Resolver};

/// A payload whose settlement is driven manually through the returned
/// sender.
pub fn gated_payload() -> (Arc<CachePayload<String>>, oneshot::Sender<String>) {
    let (tx, rx) = oneshot::channel();
    let payload = CachePayload::spawn(async move {
        rx.await.expect("settlement gate should not be dropped")
    });
    (payload, tx)
}

/// A payload that stays pending forever.
pub fn pending_payload() -> Arc<CachePayload<String>> {
    let (payload, tx) = gated_payload();
    std::mem::forget(tx);
    payload
}

/// A resolver yielding `value` after `delay`, counting its invocations.
pub fn counting_resolver(
    value: &'static str,
    delay: Duration,
) -> (Resolver<String>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let fetch = resolver(move || {
        counted.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(delay).await;
            value.to_string()
        }
    });
    (fetch, calls)
}
