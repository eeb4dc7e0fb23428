// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Args;

/// Runtime configuration for the session gateway. Every field has a
/// default and can be overridden by an environment variable, following
/// the same `clap::Args` + `env` convention used throughout this
/// workspace.
#[derive(Debug, Clone, Args)]
pub struct GatewayConfig {
    /// Identity of this gateway instance, used as the lease owner tag.
    #[arg(long, env = "SESSGATE_ID")]
    pub gateway_id: String,

    #[arg(long, default_value = "0.0.0.0", env = "SESSGATE_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8088, env = "SESSGATE_PORT")]
    pub port: u16,

    /// Shared bearer token clients must present in `hello`. A real
    /// deployment supplies its own `TokenValidator`; this is the
    /// built-in one used when no other is wired in.
    #[arg(long, env = "SESSGATE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    #[arg(long, default_value_t = 30_000, env = "SESSGATE_LEASE_TIMEOUT_MS")]
    pub lease_timeout_ms: u64,

    #[arg(long, default_value_t = 10_000, env = "SESSGATE_LEASE_REFRESH_MS")]
    pub lease_refresh_ms: u64,

    #[arg(long, default_value_t = 60_000, env = "SESSGATE_CLEANUP_INTERVAL_MS")]
    pub cleanup_interval_ms: u64,

    #[arg(long, default_value_t = 1_800_000, env = "SESSGATE_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    #[arg(long, default_value_t = 60_000, env = "SESSGATE_STALE_LEASE_TIMEOUT_MS")]
    pub stale_lease_timeout_ms: u64,

    #[arg(long, default_value_t = 604_800_000, env = "SESSGATE_MAX_SESSION_AGE_MS")]
    pub max_session_age_ms: u64,

    #[arg(long, default_value_t = 1_000, env = "SESSGATE_MAX_RECENT_EVENTS")]
    pub max_recent_events: usize,

    #[arg(long, default_value_t = 50, env = "SESSGATE_BATCH_SIZE")]
    pub batch_size: usize,

    #[arg(long, default_value_t = 100, env = "SESSGATE_FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: u64,

    #[arg(long, default_value_t = 10_000, env = "SESSGATE_MAX_QUEUE_SIZE")]
    pub max_queue_size: usize,

    #[arg(long, default_value_t = 15_000, env = "SESSGATE_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,
}

impl GatewayConfig {
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    pub fn lease_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.lease_refresh_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn stale_lease_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_lease_timeout_ms)
    }

    pub fn max_session_age(&self) -> Duration {
        Duration::from_millis(self.max_session_age_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            gateway_id: "test-gateway".to_owned(),
            host: "127.0.0.1".to_owned(),
            port: 0,
            auth_token: None,
            lease_timeout_ms: 30_000,
            lease_refresh_ms: 10_000,
            cleanup_interval_ms: 60_000,
            idle_timeout_ms: 1_800_000,
            stale_lease_timeout_ms: 60_000,
            max_session_age_ms: 604_800_000,
            max_recent_events: 1_000,
            batch_size: 50,
            flush_interval_ms: 100,
            max_queue_size: 10_000,
            heartbeat_interval_ms: 15_000,
        }
    }
}
