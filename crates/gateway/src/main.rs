// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sessgate::config::GatewayConfig;
use sessgate::storage::InMemoryStore;
use sessgate::{default_token_validator, run};

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();
    let store = Arc::new(InMemoryStore::new());
    let token_validator = default_token_validator(&cli.config);
    let shutdown = CancellationToken::new();

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    run(cli.config, store, token_validator, shutdown).await
}
