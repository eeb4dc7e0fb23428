// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable backing for the queue. Storage granularity is a flat
//! ordered list of records persisted as a whole, the same simplicity
//! the gateway's own event log uses for its append-only file.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedActionKind {
    ReplyToSession,
    UnblockTask,
    CommentOnPr,
    CompleteTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedActionStatus {
    Pending,
    Processing,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub kind: QueuedActionKind,
    pub payload: serde_json::Value,
    pub created_at_ms: u64,
    pub retry_count: u32,
    pub last_retry_at_ms: Option<u64>,
    pub next_retry_at_ms: Option<u64>,
    pub status: QueuedActionStatus,
    pub last_error: Option<String>,
}

/// Platform-specific on-device store (SQLite, files, `UserDefaults`,
/// `SharedPreferences`, ...), treated as an opaque external
/// collaborator the same way the gateway treats its database.
#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<QueuedAction>>;
    async fn save(&self, actions: &[QueuedAction]) -> anyhow::Result<()>;
}

/// In-memory reference implementation for tests.
#[derive(Default)]
pub struct InMemoryActionStore {
    actions: Mutex<Vec<QueuedAction>>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn load(&self) -> anyhow::Result<Vec<QueuedAction>> {
        Ok(self.actions.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    async fn save(&self, actions: &[QueuedAction]) -> anyhow::Result<()> {
        *self.actions.lock().unwrap_or_else(|p| p.into_inner()) = actions.to_vec();
        Ok(())
    }
}
