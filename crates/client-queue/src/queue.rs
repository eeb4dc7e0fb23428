// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{ActionStore, QueuedAction, QueuedActionKind, QueuedActionStatus};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_retries: 5, initial_retry_delay_ms: 1_000, max_retry_delay_ms: 60_000 }
    }
}

/// Executes one queued action. Implemented by whatever surface owns
/// the actual network call (e.g. posting to the gateway).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, kind: QueuedActionKind, payload: &serde_json::Value) -> Result<(), String>;
}

pub struct ActionQueue {
    store: Arc<dyn ActionStore>,
    handler: Arc<dyn ActionHandler>,
    config: QueueConfig,
    actions: Mutex<Vec<QueuedAction>>,
    processing: AtomicBool,
    online: AtomicBool,
    wake: Notify,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ActionQueue {
    pub fn new(store: Arc<dyn ActionStore>, handler: Arc<dyn ActionHandler>, config: QueueConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            handler,
            config,
            actions: Mutex::new(Vec::new()),
            processing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            wake: Notify::new(),
            cancel: Mutex::new(None),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueuedAction>> {
        self.actions.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub async fn enqueue_action(&self, kind: QueuedActionKind, payload: serde_json::Value) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now = now_ms();
        let action = QueuedAction {
            id,
            kind,
            payload,
            created_at_ms: now,
            retry_count: 0,
            last_retry_at_ms: None,
            next_retry_at_ms: Some(now),
            status: QueuedActionStatus::Pending,
            last_error: None,
        };
        let snapshot = {
            let mut actions = self.lock();
            actions.push(action);
            actions.clone()
        };
        self.persist_locked(&snapshot).await?;
        self.wake.notify_one();
        Ok(id)
    }

    pub async fn retry_failed_action(&self, id: Uuid) -> anyhow::Result<()> {
        let now = now_ms();
        let snapshot = {
            let mut actions = self.lock();
            if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
                action.retry_count = 0;
                action.next_retry_at_ms = Some(now);
                action.status = QueuedActionStatus::Pending;
                action.last_error = None;
            }
            actions.clone()
        };
        self.persist_locked(&snapshot).await?;
        self.wake.notify_one();
        Ok(())
    }

    pub async fn retry_all_failed(&self) -> anyhow::Result<()> {
        let now = now_ms();
        let snapshot = {
            let mut actions = self.lock();
            for action in actions.iter_mut().filter(|a| a.status == QueuedActionStatus::Failed) {
                action.retry_count = 0;
                action.next_retry_at_ms = Some(now);
                action.status = QueuedActionStatus::Pending;
                action.last_error = None;
            }
            actions.clone()
        };
        self.persist_locked(&snapshot).await?;
        self.wake.notify_one();
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<QueuedAction> {
        self.lock().clone()
    }

    pub fn set_online(&self, online: bool) {
        let was_offline = !self.online.swap(online, Ordering::AcqRel);
        if online && was_offline {
            self.wake.notify_one();
        }
    }

    /// Load persisted state and spawn the worker task. Idempotent:
    /// calling twice replaces the previous worker.
    pub async fn start_queue_processing(self: &Arc<Self>) -> anyhow::Result<()> {
        {
            let loaded = self.store.load().await?;
            *self.lock() = loaded;
        }

        self.stop_queue_processing();
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(cancel).await });
        Ok(())
    }

    pub fn stop_queue_processing(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap_or_else(|p| p.into_inner()).take() {
            cancel.cancel();
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let next_wait = self.process_tick().await;
            let sleep = next_wait.unwrap_or(Duration::from_secs(3600));
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }

    /// Process one pass over due actions. Returns how long to wait
    /// before the next pending action becomes due, if any remain.
    async fn process_tick(&self) -> Option<Duration> {
        if self.processing.swap(true, Ordering::AcqRel) {
            return Some(Duration::from_millis(50));
        }
        let result = self.process_tick_inner().await;
        self.processing.store(false, Ordering::Release);
        result
    }

    async fn process_tick_inner(&self) -> Option<Duration> {
        if !self.online.load(Ordering::Acquire) {
            return None;
        }

        let now = now_ms();
        let due_ids: Vec<Uuid> = {
            let actions = self.lock();
            actions
                .iter()
                .filter(|a| a.status == QueuedActionStatus::Pending && a.next_retry_at_ms.is_some_and(|t| t <= now))
                .map(|a| a.id)
                .collect()
        };

        for id in due_ids {
            let (kind, payload) = {
                let mut actions = self.lock();
                let Some(action) = actions.iter_mut().find(|a| a.id == id) else { continue };
                action.status = QueuedActionStatus::Processing;
                (action.kind, action.payload.clone())
            };

            let outcome = self.handler.handle(kind, &payload).await;

            let mut actions = self.lock();
            if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
                match outcome {
                    Ok(()) => {
                        drop(actions);
                        self.remove(id);
                        continue;
                    }
                    Err(err) => {
                        action.retry_count += 1;
                        action.last_retry_at_ms = Some(now_ms());
                        action.last_error = Some(err.clone());
                        if action.retry_count >= self.config.max_retries {
                            action.status = QueuedActionStatus::Failed;
                            action.next_retry_at_ms = None;
                            warn!(action_id = %id, error = %err, "action exhausted retries");
                        } else {
                            let delay = backoff_delay(&self.config, action.retry_count);
                            action.next_retry_at_ms = Some(now_ms() + delay.as_millis() as u64);
                            action.status = QueuedActionStatus::Pending;
                            debug!(action_id = %id, retry_count = action.retry_count, delay_ms = delay.as_millis() as u64, "action failed, scheduled retry");
                        }
                    }
                }
            }
        }

        let snapshot = self.lock().clone();
        if let Err(err) = self.persist_locked(&snapshot).await {
            warn!(error = %err, "failed to persist action queue state");
        }

        snapshot
            .iter()
            .filter(|a| a.status == QueuedActionStatus::Pending)
            .filter_map(|a| a.next_retry_at_ms)
            .min()
            .map(|t| Duration::from_millis(t.saturating_sub(now_ms())))
    }

    fn remove(&self, id: Uuid) {
        self.lock().retain(|a| a.id != id);
    }

    async fn persist_locked(&self, actions: &[QueuedAction]) -> anyhow::Result<()> {
        self.store.save(actions).await
    }
}

fn backoff_delay(config: &QueueConfig, retry_count: u32) -> Duration {
    let scaled = config.initial_retry_delay_ms.saturating_mul(1u64 << retry_count.min(20));
    Duration::from_millis(scaled.min(config.max_retry_delay_ms))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
