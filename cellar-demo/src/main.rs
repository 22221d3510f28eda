//! Cellar demo: cached vs uncached consumers.
//!
//! Reproduces the classic shape of the problem this cache solves: a group
//! of consumers that all want the same remote value. The cached group
//! shares one scope and one key, so the simulated server is hit once; the
//! uncached group resolves independently and hits it once per consumer.
//! A full clear then drives the cached group back to loading and triggers
//! exactly one fresh fetch.

mod fetcher;

use std::sync::Arc;
use std::time::Duration;

use cellar_scope::{create_scope, request_clear, ValueBinding};

use crate::fetcher::{create_fetcher, fetch_count};

const CONSUMERS: usize = 4;
const FETCH_DELAY: Duration = Duration::from_millis(300);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let scope = create_scope::<&str, String>();
    let fetch = create_fetcher(FETCH_DELAY);

    // Cached consumers: all four share the "test" key within the scope.
    let mut cached: Vec<ValueBinding<&str, String>> =
        (0..CONSUMERS).map(|_| ValueBinding::new()).collect();
    for (index, consumer) in cached.iter_mut().enumerate() {
        let state = consumer.request(Some(&scope), "test", Arc::clone(&fetch));
        tracing::info!(consumer = index, loading = state.loading, "cached consumer attached");
    }

    for (index, consumer) in cached.iter().enumerate() {
        let state = consumer.wait_ready().await.expect("consumer is bound");
        tracing::info!(consumer = index, value = ?state.value, "cached consumer ready");
    }
    tracing::info!(fetches = fetch_count(), "all cached consumers served by one fetch");

    // Uncached consumers: each resolves the same resource on its own.
    for index in 0..CONSUMERS {
        let uncached = create_fetcher(FETCH_DELAY);
        let value = uncached().await;
        tracing::info!(consumer = index, %value, "uncached consumer ready");
    }
    tracing::info!(fetches = fetch_count(), "uncached consumers paid one fetch each");

    // Full invalidation: everyone back to loading, then one fresh fetch.
    request_clear(&scope);
    for (index, consumer) in cached.iter().enumerate() {
        tracing::info!(
            consumer = index,
            loading = consumer.snapshot().loading,
            "after clear"
        );
    }

    for consumer in cached.iter_mut() {
        consumer.request(Some(&scope), "test", Arc::clone(&fetch));
    }
    let state = cached[0]
        .wait_ready()
        .await
        .expect("consumer is bound after clear");
    tracing::info!(
        value = ?state.value,
        fetches = fetch_count(),
        "cache refilled with a single fetch"
    );
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cellar_core=debug,cellar_scope=debug"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
