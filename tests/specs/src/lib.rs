// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for end-to-end tests: spawns the real `sessgate`
//! binary and drives it over its actual WebSocket port.

use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for `rustls`/`tokio-tungstenite`
/// exactly once per test process.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `sessgate` binary relative to
/// this crate's manifest directory.
pub fn sessgate_binary() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let target_dir = manifest_dir.join("../../target/debug");
    target_dir.join("sessgate")
}

pub fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port").local_addr().expect("local addr").port()
}

pub struct GatewayBuilder {
    port: u16,
    auth_token: Option<String>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self { port: free_port(), auth_token: None }
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn spawn(self) -> GatewayProcess {
        ensure_crypto();
        let mut command = Command::new(sessgate_binary());
        command
            .env("SESSGATE_ID", "specs-gateway")
            .env("SESSGATE_HOST", "127.0.0.1")
            .env("SESSGATE_PORT", self.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(token) = &self.auth_token {
            command.env("SESSGATE_AUTH_TOKEN", token);
        }
        let child = command.spawn().expect("spawn sessgate binary");
        GatewayProcess { child, port: self.port }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GatewayProcess {
    child: Child,
    port: u16,
}

impl GatewayProcess {
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}/api/v1/health", self.port)
    }

    pub async fn wait_healthy(&self) {
        let url = self.health_url();
        for _ in 0..50 {
            if reqwest::get(&url).await.is_ok_and(|r| r.status().is_success()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("sessgate did not become healthy at {url}");
    }
}

impl Drop for GatewayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
