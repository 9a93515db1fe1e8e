//! Shared context store: versioning, history and contention.

use std::sync::Arc;

use rewind_core::{payload, ContextStore, HistoryAction};
use serde_json::json;

#[test]
fn test_version_counts_mutating_calls() {
    let ctx = ContextStore::new();
    ctx.set("a", json!(1), None);
    ctx.update(payload(json!({"b": 2, "c": 3})), Some("match_analysis"));
    ctx.set("a", json!(10), Some("insights_generation"));

    assert_eq!(ctx.get_version(), 3);
    assert_eq!(ctx.get_history().len(), 3);
    assert_eq!(ctx.get("a"), Some(json!(10)));

    let actions: Vec<HistoryAction> = ctx.get_history().iter().map(|h| h.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::Set, HistoryAction::Update, HistoryAction::Set]
    );
}

#[test]
fn test_clear_counts_toward_version_but_not_history() {
    let ctx = ContextStore::new();
    ctx.set("a", json!(1), None);
    ctx.clear();
    ctx.set("b", json!(2), None);

    assert_eq!(ctx.get_version(), 3);
    assert_eq!(ctx.get_history().len(), 2);
    assert!(!ctx.has("a"));
    assert!(ctx.has("b"));
}

#[test]
fn test_missing_key_returns_default() {
    let ctx = ContextStore::new();
    assert_eq!(ctx.get("missing"), None);
    assert_eq!(ctx.get_or("missing", json!({"d": true})), json!({"d": true}));
    assert!(!ctx.has("missing"));
    assert_eq!(ctx.get_version(), 0);
}

#[test]
fn test_session_id_is_fixed_across_clear() {
    let ctx = ContextStore::new();
    let session = ctx.session_id();
    ctx.set("a", json!(1), None);
    ctx.clear();
    assert_eq!(ctx.session_id(), session);
}

#[test]
fn test_concurrent_writers_lose_no_updates() {
    let ctx = Arc::new(ContextStore::new());
    let writers = 32;
    let per_writer = 25;

    let threads: Vec<_> = (0..writers)
        .map(|w| {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                for i in 0..per_writer {
                    if i % 2 == 0 {
                        ctx.set(format!("w{w}"), json!(i), Some("writer"));
                    } else {
                        ctx.update(payload(json!({ format!("w{w}"): i })), Some("writer"));
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(ctx.get_version(), (writers * per_writer) as u64);
    assert_eq!(ctx.len(), writers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_lose_no_updates() {
    let ctx = Arc::new(ContextStore::new());
    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.set("shared", json!(i), None) })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }
    assert_eq!(ctx.get_version(), 100);
    assert!(ctx.has("shared"));
}
