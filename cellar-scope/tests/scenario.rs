//! End-to-end scenario: multiple consumers sharing a scope, full clear,
//! fresh resolution.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cellar_scope::{create_scope, request_clear, ValueBinding};
use cellar_test_utils::counting_resolver;

const RESOLVE_DELAY: Duration = Duration::from_millis(100);

#[tokio::test(start_paused = true)]
async fn test_shared_scope_end_to_end() {
    let scope = create_scope::<&str, String>();
    let (test_fetch, test_calls) = counting_resolver("VALUE", RESOLVE_DELAY);
    let (other_fetch, other_calls) = counting_resolver("OTHER", RESOLVE_DELAY);

    // Two consumers share the "test" key, a third requests its own key.
    let mut first = ValueBinding::new();
    let mut second = ValueBinding::new();
    let mut third = ValueBinding::new();

    assert!(first.request(Some(&scope), "test", Arc::clone(&test_fetch)).loading);
    assert!(second.request(Some(&scope), "test", Arc::clone(&test_fetch)).loading);
    assert!(third.request(Some(&scope), "other", Arc::clone(&other_fetch)).loading);

    // Single flight per key: one computation for "test", an independent
    // one for "other".
    assert_eq!(test_calls.load(Ordering::SeqCst), 1);
    assert_eq!(other_calls.load(Ordering::SeqCst), 1);

    let a = first.wait_ready().await.expect("first should be bound");
    let b = second.wait_ready().await.expect("second should be bound");
    let c = third.wait_ready().await.expect("third should be bound");
    assert_eq!(a.value, Some("VALUE".to_string()));
    assert_eq!(b.value, Some("VALUE".to_string()));
    assert_eq!(c.value, Some("OTHER".to_string()));
    assert_eq!(test_calls.load(Ordering::SeqCst), 1);

    // Full invalidation drives every consumer back to loading and swaps
    // the cache instance out from under new requests.
    let retired = scope.current();
    request_clear(&scope);
    assert!(first.snapshot().loading);
    assert!(second.snapshot().loading);
    assert!(third.snapshot().loading);
    assert!(!Arc::ptr_eq(&retired, &scope.current()));

    // Still-mounted consumers re-resolve against the fresh cache.
    assert!(first.request(Some(&scope), "test", Arc::clone(&test_fetch)).loading);
    assert!(second.request(Some(&scope), "test", Arc::clone(&test_fetch)).loading);
    assert!(third.request(Some(&scope), "other", Arc::clone(&other_fetch)).loading);
    assert_eq!(test_calls.load(Ordering::SeqCst), 2);
    assert_eq!(other_calls.load(Ordering::SeqCst), 2);

    let a = first.wait_ready().await.expect("first should be bound");
    assert_eq!(a.value, Some("VALUE".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_consumer_detaching_does_not_cancel_the_fetch() {
    let scope = create_scope::<&str, String>();
    let (fetch, calls) = counting_resolver("VALUE", RESOLVE_DELAY);

    let mut leaver = ValueBinding::new();
    leaver.request(Some(&scope), "test", Arc::clone(&fetch));
    drop(leaver);

    // The computation keeps running; a later consumer of the same key
    // still shares it instead of starting a second one.
    let mut stayer = ValueBinding::new();
    stayer.request(Some(&scope), "test", Arc::clone(&fetch));
    let ready = stayer.wait_ready().await.expect("stayer should be bound");
    assert_eq!(ready.value, Some("VALUE".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
