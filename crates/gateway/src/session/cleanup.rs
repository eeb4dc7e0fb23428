// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic reconciliation sweep: stale leases, idle sessions, aged
//! sessions, and local terminal actors with no subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::events::{now_ms, SessionStatus};
use crate::session::manager::SessionManager;
use crate::storage::SessionStore;

pub struct CleanupLoop {
    config: GatewayConfig,
    store: Arc<dyn SessionStore>,
    manager: Arc<SessionManager>,
    running: AtomicBool,
}

impl CleanupLoop {
    pub fn new(config: GatewayConfig, store: Arc<dyn SessionStore>, manager: Arc<SessionManager>) -> Arc<Self> {
        Arc::new(Self { config, store, manager, running: AtomicBool::new(false) })
    }

    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.cleanup_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => this.run_once().await,
                }
            }
        });
    }

    /// Run one sweep. Re-entrancy guarded: a tick that starts while a
    /// prior tick is still in flight is a no-op.
    pub async fn run_once(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("cleanup sweep already in flight, skipping this tick");
            return;
        }

        self.reap_stale_leases().await;
        self.reap_idle_sessions().await;
        self.reap_aged_sessions().await;
        self.reap_local_terminal_actors().await;

        self.running.store(false, Ordering::Release);
    }

    async fn reap_stale_leases(&self) {
        let now = now_ms();
        let stale_before = now.saturating_sub(self.config.stale_lease_timeout_ms);
        match self.store.get_stale_session_ids(stale_before).await {
            Ok(ids) => {
                for id in ids {
                    debug!(session_id = %id, "reclaiming session with stale lease");
                    self.stop_and_evict(id).await;
                }
            }
            Err(err) => warn!(error = %err, "failed to query stale leases"),
        }
    }

    async fn reap_idle_sessions(&self) {
        let idle_before = now_ms().saturating_sub(self.config.idle_timeout_ms);
        match self.store.get_idle_sessions(idle_before).await {
            Ok(ids) => {
                for id in ids {
                    debug!(session_id = %id, "reaping long-idle session");
                    self.stop_and_evict(id).await;
                }
            }
            Err(err) => warn!(error = %err, "failed to query idle sessions"),
        }
    }

    async fn reap_aged_sessions(&self) {
        let older_than = now_ms().saturating_sub(self.config.max_session_age_ms);
        match self.store.get_old_sessions(older_than).await {
            Ok(ids) => {
                if !ids.is_empty() {
                    debug!(count = ids.len(), "sessions past max age, handing off to storage-side retention");
                }
            }
            Err(err) => warn!(error = %err, "failed to query aged sessions"),
        }
        if let Err(err) = self.store.delete_old_events(older_than).await {
            warn!(error = %err, "failed to delete events past retention cutoff");
        }
    }

    async fn reap_local_terminal_actors(&self) {
        for actor in self.manager.all().await {
            let terminal = matches!(actor.status(), SessionStatus::Stopped | SessionStatus::Error);
            if terminal && actor.subscriber_count() == 0 {
                self.manager.remove_session(actor.id).await;
            }
        }
    }

    async fn stop_and_evict(&self, id: Uuid) {
        if let Err(err) = self.store.mark_session_stopped(id, SessionStatus::Stopped).await {
            warn!(session_id = %id, error = %err, "failed to mark session stopped during cleanup");
        }
        self.manager.remove_session(id).await;
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
