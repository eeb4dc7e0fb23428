// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::*;
use crate::events::OutputStream;
use crate::storage::InMemoryStore;

fn new_actor(idle_timeout: Duration) -> Arc<SessionActor> {
    let store: Arc<dyn crate::storage::SessionStore> = Arc::new(InMemoryStore::new());
    let (writer, _cancel) = PersistenceWriter::spawn(store, 50, Duration::from_millis(10), 1000, None);
    SessionActor::new(Uuid::new_v4(), "u1".to_owned(), SessionStatus::Running, 1, writer, 1000, idle_timeout, None)
}

#[tokio::test]
async fn sequence_numbers_are_dense_and_monotonic() {
    let actor = new_actor(Duration::from_secs(3600));
    for i in 0..10u32 {
        actor.handle_agent_output(format!("chunk-{i}"), OutputStream::Stdout);
    }
    assert_eq!(actor.latest_seq(), 10);
}

#[tokio::test]
async fn catch_up_returns_only_events_after_last_ack() {
    let actor = new_actor(Duration::from_secs(3600));
    for i in 0..5u32 {
        actor.handle_agent_output(format!("chunk-{i}"), OutputStream::Stdout);
    }
    let (tx, mut rx) = mpsc::channel(16);
    actor.attach_subscriber("c1".to_owned(), tx, 2);

    let subscribed = rx.try_recv().expect("subscribed reply");
    let ServerMessage::Subscribed { latest_seq, .. } = subscribed else { panic!("wrong variant") };
    assert_eq!(latest_seq, 5);

    let mut seqs = Vec::new();
    while let Ok(ServerMessage::Event { event, .. }) = rx.try_recv() {
        seqs.push(event.seq);
    }
    assert_eq!(seqs, vec![3, 4, 5]);
}

#[tokio::test]
async fn idle_timeout_fires_after_last_subscriber_detaches() {
    let actor = new_actor(Duration::from_millis(30));
    let (tx, _rx) = mpsc::channel(16);
    actor.attach_subscriber("c1".to_owned(), tx, 0);
    assert_eq!(actor.status(), SessionStatus::Running);

    actor.detach_subscriber("c1");
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(actor.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn reattaching_before_idle_timeout_cancels_it() {
    let actor = new_actor(Duration::from_millis(50));
    let (tx, _rx) = mpsc::channel(16);
    actor.attach_subscriber("c1".to_owned(), tx.clone(), 0);
    actor.detach_subscriber("c1");
    tokio::time::sleep(Duration::from_millis(10)).await;
    actor.attach_subscriber("c1".to_owned(), tx, 0);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(actor.status(), SessionStatus::Running);
}

#[tokio::test]
async fn input_ack_seq_matches_the_emitted_event() {
    let actor = new_actor(Duration::from_secs(3600));
    let seq = actor.handle_input("hello".to_owned(), "i1".to_owned());
    assert_eq!(seq, 1);
    assert_eq!(actor.latest_seq(), 1);
}

#[tokio::test]
async fn abnormal_exit_reaches_error_status() {
    let actor = new_actor(Duration::from_secs(3600));
    actor.handle_agent_exit(Some(137), Some("SIGKILL".to_owned()));
    assert_eq!(actor.status(), SessionStatus::Error);
}

#[tokio::test]
async fn clean_exit_reaches_stopped_status() {
    let actor = new_actor(Duration::from_secs(3600));
    actor.handle_agent_exit(Some(0), None);
    assert_eq!(actor.status(), SessionStatus::Stopped);
}
