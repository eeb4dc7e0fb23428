// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session gateway: multiplexes long-lived interactive agent sessions
//! between client devices and server-side agent processes.

pub mod config;
pub mod error;
pub mod events;
pub mod persistence;
pub mod session;
pub mod state;
pub mod storage;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::GatewayConfig;
use persistence::PersistenceWriter;
use session::cleanup::CleanupLoop;
use session::manager::SessionManager;
use storage::SessionStore;
use transport::auth::{StaticTokenValidator, TokenValidator};

/// Build and run the gateway until `shutdown` is cancelled.
pub async fn run(config: GatewayConfig, store: Arc<dyn SessionStore>, token_validator: Arc<dyn TokenValidator>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let on_flush_error: persistence::FlushErrorHook = Arc::new(|events| {
        warn!(count = events.len(), "batch of events failed to persist, dropping after exhausting retries");
    });
    let (writer, writer_cancel) = PersistenceWriter::spawn(
        store.clone(),
        config.batch_size,
        Duration::from_millis(config.flush_interval_ms),
        config.max_queue_size,
        Some(on_flush_error),
    );

    let manager = SessionManager::new(config.clone(), store.clone(), writer);
    manager.spawn_lease_refresh(shutdown.clone());

    let cleanup = CleanupLoop::new(config.clone(), store.clone(), Arc::clone(&manager));
    cleanup.spawn(shutdown.clone());

    let state = state::GatewayState { config: config.clone(), manager, token_validator, shutdown: shutdown.clone() };
    let router = transport::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr, "session gateway listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    writer_cancel.cancel();
    Ok(())
}

/// Convenience constructor for the bundled static-token validator, for
/// single-operator deployments that don't wire in their own identity
/// provider.
pub fn default_token_validator(config: &GatewayConfig) -> Arc<dyn TokenValidator> {
    Arc::new(StaticTokenValidator::new(config.auth_token.clone(), "default-user"))
}
