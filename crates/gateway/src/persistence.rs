// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, batching persistence writer. Events are enqueued by
//! session actors and flushed to durable storage by a single
//! background task, never by the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::SessionEvent;
use crate::storage::SessionStore;

/// Invoked with the events from a batch that failed to persist.
/// Upstream decides whether to retry or dead-letter them; the writer
/// itself never retries.
pub type FlushErrorHook = Arc<dyn Fn(Vec<SessionEvent>) + Send + Sync>;

/// Handle to the running writer. Cheap to clone; `enqueue` never
/// blocks the caller.
#[derive(Clone)]
pub struct PersistenceWriter {
    tx: mpsc::Sender<SessionEvent>,
    queue_len: Arc<AtomicUsize>,
    max_queue_size: usize,
}

impl PersistenceWriter {
    /// Spawn the writer's flush loop. Returns the handle and the
    /// `CancellationToken` that `stop()` fires to drain and exit.
    /// `on_flush_error`, when set, receives the events from any batch
    /// that failed to persist.
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        batch_size: usize,
        flush_interval: Duration,
        max_queue_size: usize,
        on_flush_error: Option<FlushErrorHook>,
    ) -> (Self, CancellationToken) {
        let (tx, rx) = mpsc::channel(max_queue_size);
        let queue_len = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        tokio::spawn(run_flush_loop(rx, store, batch_size, flush_interval, Arc::clone(&queue_len), cancel.clone(), on_flush_error));

        (Self { tx, queue_len, max_queue_size }, cancel)
    }

    /// Offer a record to the writer. Returns `false` (and drops the
    /// record) if the queue is at capacity; the caller does not
    /// retry, matching the documented backpressure policy.
    pub fn enqueue(&self, event: SessionEvent) -> bool {
        if self.queue_len.load(Ordering::Relaxed) >= self.max_queue_size {
            warn!(session_id = %event.session_id, seq = event.seq, "persistence queue full, dropping event");
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                self.queue_len.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                warn!("persistence writer channel closed or full, dropping event");
                false
            }
        }
    }

    /// Whether the writer has queue headroom left. Callers may use
    /// this to drop non-critical events under load.
    pub fn healthy(&self) -> bool {
        (self.queue_len.load(Ordering::Relaxed) as f64) < (self.max_queue_size as f64) * 0.8
    }
}

async fn run_flush_loop(
    mut rx: mpsc::Receiver<SessionEvent>,
    store: Arc<dyn SessionStore>,
    batch_size: usize,
    flush_interval: Duration,
    queue_len: Arc<AtomicUsize>,
    cancel: CancellationToken,
    on_flush_error: Option<FlushErrorHook>,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                rx.close();
                drain_remaining(&mut rx, &mut batch, batch_size, &queue_len, &store, &on_flush_error).await;
                flush_batch(&store, &mut batch, &queue_len, &on_flush_error).await;
                return;
            }
            _ = ticker.tick() => {
                flush_batch(&store, &mut batch, &queue_len, &on_flush_error).await;
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= batch_size {
                            flush_batch(&store, &mut batch, &queue_len, &on_flush_error).await;
                        }
                    }
                    None => {
                        flush_batch(&store, &mut batch, &queue_len, &on_flush_error).await;
                        return;
                    }
                }
            }
        }
    }
}

async fn drain_remaining(
    rx: &mut mpsc::Receiver<SessionEvent>,
    batch: &mut Vec<SessionEvent>,
    batch_size: usize,
    queue_len: &Arc<AtomicUsize>,
    store: &Arc<dyn SessionStore>,
    on_flush_error: &Option<FlushErrorHook>,
) {
    while let Ok(event) = rx.try_recv() {
        batch.push(event);
        if batch.len() >= batch_size {
            flush_batch(store, batch, queue_len, on_flush_error).await;
        }
    }
}

async fn flush_batch(store: &Arc<dyn SessionStore>, batch: &mut Vec<SessionEvent>, queue_len: &Arc<AtomicUsize>, on_flush_error: &Option<FlushErrorHook>) {
    if batch.is_empty() {
        return;
    }
    let drained: Vec<SessionEvent> = batch.drain(..).collect();
    let n = drained.len();
    let mut failed = Vec::new();
    for event in drained {
        if let Err(err) = store.persist_event(event.clone()).await {
            warn!(error = %err, session_id = %event.session_id, seq = event.seq, "persistence flush failed for one event in batch");
            failed.push(event);
        }
    }
    if !failed.is_empty() {
        if let Some(hook) = on_flush_error {
            hook(failed);
        }
    }
    queue_len.fetch_sub(n, Ordering::Relaxed);
    debug!(count = n, "flushed event batch");
}
