// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable-storage collaborator. The gateway never talks to a
//! database directly; every durable operation goes through this
//! trait, the same inversion the upstream/credential modules use for
//! `UpstreamClient`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{now_ms, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub agent_type: String,
    pub working_directory: String,
    pub worktree_id: Option<String>,
    pub repository_id: Option<String>,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub next_seq: u64,
    pub lease_owner: Option<String>,
    pub lease_expires_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub agent_type: String,
    pub working_directory: String,
    pub worktree_id: Option<String>,
    pub repository_id: Option<String>,
    pub title: Option<String>,
}

/// Callback contract the gateway core treats as opaque external
/// storage. An implementor is free to back this with any database;
/// the reference implementation in this module is purely in-memory
/// and is what the test suite and `for_test` constructors use.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, id: Uuid) -> anyhow::Result<Option<SessionRecord>>;
    async fn create_session(&self, cfg: NewSession) -> anyhow::Result<SessionRecord>;
    async fn update_session_lease(&self, id: Uuid, gateway_id: &str, expires_at_ms: u64) -> anyhow::Result<()>;
    async fn release_session_lease(&self, id: Uuid) -> anyhow::Result<()>;
    async fn mark_session_stopped(&self, id: Uuid, status: SessionStatus) -> anyhow::Result<()>;
    async fn touch_activity(&self, id: Uuid) -> anyhow::Result<()>;
    async fn get_stale_session_ids(&self, stale_before_ms: u64) -> anyhow::Result<Vec<Uuid>>;
    async fn get_idle_sessions(&self, idle_before_ms: u64) -> anyhow::Result<Vec<Uuid>>;
    async fn get_old_sessions(&self, older_than_ms: u64) -> anyhow::Result<Vec<Uuid>>;
    async fn persist_event(&self, event: crate::events::SessionEvent) -> anyhow::Result<()>;
    async fn delete_old_events(&self, older_than_ms: u64) -> anyhow::Result<()>;
}

/// In-memory reference implementation. Suitable for tests and for a
/// single-replica deployment with no durability requirement across
/// restarts.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<Uuid, SessionRecord>>,
    events: Mutex<Vec<crate::events::SessionEvent>>,
    fail_next_persist: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persisted_events(&self) -> Vec<crate::events::SessionEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Test hook: make the next `n` calls to `persist_event` return an
    /// error instead of recording the event.
    pub fn fail_next_persist(&self, n: usize) {
        self.fail_next_persist.store(n, Ordering::Relaxed);
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load_session(&self, id: Uuid) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().unwrap_or_else(|p| p.into_inner()).get(&id).cloned())
    }

    async fn create_session(&self, cfg: NewSession) -> anyhow::Result<SessionRecord> {
        let id = Uuid::new_v4();
        let now = now_ms();
        let record = SessionRecord {
            id,
            user_id: cfg.user_id,
            agent_type: cfg.agent_type,
            working_directory: cfg.working_directory,
            worktree_id: cfg.worktree_id,
            repository_id: cfg.repository_id,
            title: cfg.title,
            status: SessionStatus::Provisioning,
            next_seq: 1,
            lease_owner: None,
            lease_expires_at_ms: None,
            created_at_ms: now,
            last_activity_ms: now,
        };
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).insert(id, record.clone());
        Ok(record)
    }

    async fn update_session_lease(&self, id: Uuid, gateway_id: &str, expires_at_ms: u64) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(record) = sessions.get_mut(&id) {
            record.lease_owner = Some(gateway_id.to_owned());
            record.lease_expires_at_ms = Some(expires_at_ms);
        }
        Ok(())
    }

    async fn release_session_lease(&self, id: Uuid) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(record) = sessions.get_mut(&id) {
            record.lease_owner = None;
            record.lease_expires_at_ms = None;
        }
        Ok(())
    }

    async fn mark_session_stopped(&self, id: Uuid, status: SessionStatus) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(record) = sessions.get_mut(&id) {
            record.status = status;
            record.lease_owner = None;
            record.lease_expires_at_ms = None;
        }
        Ok(())
    }

    async fn touch_activity(&self, id: Uuid) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(record) = sessions.get_mut(&id) {
            record.last_activity_ms = now_ms();
        }
        Ok(())
    }

    async fn get_stale_session_ids(&self, stale_before_ms: u64) -> anyhow::Result<Vec<Uuid>> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        Ok(sessions
            .values()
            .filter(|r| r.lease_owner.is_some() && r.lease_expires_at_ms.is_some_and(|e| e < stale_before_ms))
            .map(|r| r.id)
            .collect())
    }

    async fn get_idle_sessions(&self, idle_before_ms: u64) -> anyhow::Result<Vec<Uuid>> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        Ok(sessions
            .values()
            .filter(|r| matches!(r.status, SessionStatus::Running | SessionStatus::Idle) && r.last_activity_ms < idle_before_ms)
            .map(|r| r.id)
            .collect())
    }

    async fn get_old_sessions(&self, older_than_ms: u64) -> anyhow::Result<Vec<Uuid>> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        Ok(sessions.values().filter(|r| r.created_at_ms < older_than_ms).map(|r| r.id).collect())
    }

    async fn persist_event(&self, event: crate::events::SessionEvent) -> anyhow::Result<()> {
        let mut remaining = self.fail_next_persist.load(Ordering::Relaxed);
        while remaining > 0 {
            match self.fail_next_persist.compare_exchange(remaining, remaining - 1, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return Err(anyhow::anyhow!("simulated persist failure")),
                Err(actual) => remaining = actual,
            }
        }
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
        Ok(())
    }

    async fn delete_old_events(&self, older_than_ms: u64) -> anyhow::Result<()> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).retain(|e| e.created_at_ms >= older_than_ms);
        Ok(())
    }
}
