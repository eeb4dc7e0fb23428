// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of locally hosted session actors, with lease claim and
//! periodic renewal so exactly one gateway replica owns a session at
//! a time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::events::{now_ms, SessionStatus};
use crate::persistence::PersistenceWriter;
use crate::session::actor::SessionActor;
use crate::storage::{NewSession, SessionStore};

pub struct SessionManager {
    config: GatewayConfig,
    store: Arc<dyn SessionStore>,
    persistence: PersistenceWriter,
    sessions: RwLock<HashMap<Uuid, Arc<SessionActor>>>,
}

impl SessionManager {
    pub fn new(config: GatewayConfig, store: Arc<dyn SessionStore>, persistence: PersistenceWriter) -> Arc<Self> {
        Arc::new(Self { config, store, persistence, sessions: RwLock::new(HashMap::new()) })
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionActor>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<SessionActor>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Return every locally hosted actor owned by `user_id`.
    pub async fn by_user(&self, user_id: &str) -> Vec<Arc<SessionActor>> {
        self.sessions.read().await.values().filter(|actor| actor.user_id == user_id).cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Return the cached actor for `id`, or load its record from
    /// storage and instantiate one. Returns `None` if no such session
    /// exists durably.
    pub async fn get_or_load_session(self: &Arc<Self>, id: Uuid) -> anyhow::Result<Option<Arc<SessionActor>>> {
        if let Some(actor) = self.get(id).await {
            return Ok(Some(actor));
        }

        let Some(record) = self.store.load_session(id).await? else {
            return Ok(None);
        };

        let actor = self.instantiate(record).await?;
        Ok(Some(actor))
    }

    pub async fn create_session(self: &Arc<Self>, cfg: NewSession) -> anyhow::Result<Arc<SessionActor>> {
        let record = self.store.create_session(cfg).await?;
        self.instantiate(record).await
    }

    async fn instantiate(self: &Arc<Self>, record: crate::storage::SessionRecord) -> anyhow::Result<Arc<SessionActor>> {
        let manager = Arc::clone(self);
        let hook: crate::session::actor::StatusChangeHook = Arc::new(move |id, status| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                if let Err(err) = manager.store.mark_session_stopped(id, status).await {
                    warn!(session_id = %id, error = %err, "failed to record status change");
                }
                if matches!(status, SessionStatus::Stopped | SessionStatus::Error) {
                    manager.remove_local(id).await;
                }
            });
        });

        let actor = SessionActor::new(
            record.id,
            record.user_id.clone(),
            record.status,
            record.next_seq,
            self.persistence.clone(),
            self.config.max_recent_events,
            self.config.idle_timeout(),
            Some(hook),
        );

        self.sessions.write().await.insert(record.id, Arc::clone(&actor));

        let expires_at = now_ms() + self.config.lease_timeout_ms;
        self.store.update_session_lease(record.id, &self.config.gateway_id, expires_at).await?;

        Ok(actor)
    }

    /// Destroy and evict the local actor and release its lease.
    pub async fn remove_session(&self, id: Uuid) {
        self.remove_local(id).await;
        if let Err(err) = self.store.release_session_lease(id).await {
            warn!(session_id = %id, error = %err, "failed to release lease on removal");
        }
    }

    async fn remove_local(&self, id: Uuid) {
        if let Some(actor) = self.sessions.write().await.remove(&id) {
            actor.destroy();
        }
    }

    /// Spawn the periodic lease-renewal task. Renews every locally
    /// hosted session's lease; a failed round trip is logged and
    /// retried on the next tick.
    pub fn spawn_lease_refresh(self: &Arc<Self>, shutdown: CancellationToken) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.lease_refresh_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => manager.renew_all_leases().await,
                }
            }
        });
    }

    async fn renew_all_leases(&self) {
        let ids: Vec<Uuid> = self.sessions.read().await.keys().copied().collect();
        let expires_at = now_ms() + self.config.lease_timeout_ms;
        for id in ids {
            if let Err(err) = self.store.update_session_lease(id, &self.config.gateway_id, expires_at).await {
                warn!(session_id = %id, error = %err, "lease renewal failed, will retry next tick");
            } else {
                debug!(session_id = %id, "lease renewed");
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
