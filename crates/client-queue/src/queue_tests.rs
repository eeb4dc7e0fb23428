// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::store::InMemoryActionStore;

struct AlwaysFails {
    attempts: AtomicUsize,
}

#[async_trait]
impl ActionHandler for AlwaysFails {
    async fn handle(&self, _kind: QueuedActionKind, _payload: &serde_json::Value) -> Result<(), String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err("boom".to_owned())
    }
}

struct AlwaysSucceeds {
    attempts: AtomicUsize,
}

#[async_trait]
impl ActionHandler for AlwaysSucceeds {
    async fn handle(&self, _kind: QueuedActionKind, _payload: &serde_json::Value) -> Result<(), String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn enqueue_and_succeed_removes_the_action() {
    let store = Arc::new(InMemoryActionStore::new());
    let handler = Arc::new(AlwaysSucceeds { attempts: AtomicUsize::new(0) });
    let queue = ActionQueue::new(store, handler.clone(), QueueConfig::default());
    queue.start_queue_processing().await.expect("starts");

    queue.enqueue_action(QueuedActionKind::ReplyToSession, serde_json::json!({"text":"hi"})).await.expect("enqueues");

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(queue.snapshot().len(), 0);
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
    queue.stop_queue_processing();
}

#[tokio::test]
async fn failing_action_backs_off_and_eventually_fails_terminally() {
    let store = Arc::new(InMemoryActionStore::new());
    let handler = Arc::new(AlwaysFails { attempts: AtomicUsize::new(0) });
    let mut config = QueueConfig::default();
    config.initial_retry_delay_ms = 5;
    config.max_retry_delay_ms = 20;
    config.max_retries = 3;
    let queue = ActionQueue::new(store, handler.clone(), config);
    queue.start_queue_processing().await.expect("starts");

    queue.enqueue_action(QueuedActionKind::CompleteTask, serde_json::json!({})).await.expect("enqueues");

    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].status, QueuedActionStatus::Failed);
    assert_eq!(snapshot[0].retry_count, 3);
    assert!(handler.attempts.load(Ordering::SeqCst) >= 3);
    queue.stop_queue_processing();
}

#[tokio::test]
async fn retry_failed_action_resets_it_to_pending() {
    let store = Arc::new(InMemoryActionStore::new());
    let handler = Arc::new(AlwaysFails { attempts: AtomicUsize::new(0) });
    let mut config = QueueConfig::default();
    config.max_retries = 1;
    config.initial_retry_delay_ms = 5;
    let queue = ActionQueue::new(store, handler, config);
    queue.start_queue_processing().await.expect("starts");

    let id = queue.enqueue_action(QueuedActionKind::UnblockTask, serde_json::json!({})).await.expect("enqueues");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.snapshot()[0].status, QueuedActionStatus::Failed);

    queue.retry_failed_action(id).await.expect("retries");
    let snapshot = queue.snapshot();
    assert_eq!(snapshot[0].status, QueuedActionStatus::Pending);
    assert_eq!(snapshot[0].retry_count, 0);
    queue.stop_queue_processing();
}

#[test]
fn backoff_delay_doubles_and_caps_at_max() {
    let config = QueueConfig { max_retries: 10, initial_retry_delay_ms: 1_000, max_retry_delay_ms: 60_000 };
    assert_eq!(backoff_delay(&config, 1), Duration::from_millis(2_000));
    assert_eq!(backoff_delay(&config, 2), Duration::from_millis(4_000));
    assert_eq!(backoff_delay(&config, 6), Duration::from_millis(60_000));
}
