//! Simulated remote resource with a visible global call counter.
//!
//! Every resolution sleeps for the configured delay and then reports how
//! many fetches have run so far, which makes deduplication (or the lack
//! of it) directly observable in the output.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cellar_scope::{resolver, Resolver};

static FETCH_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Build a fetcher that resolves after `delay`.
pub fn create_fetcher(delay: Duration) -> Resolver<String> {
    resolver(move || async move {
        tokio::time::sleep(delay).await;
        let count = FETCH_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
        format!("fetch called {count} times")
    })
}

/// Total fetches performed so far, cached and uncached alike.
pub fn fetch_count() -> usize {
    FETCH_COUNT.load(Ordering::SeqCst)
}
