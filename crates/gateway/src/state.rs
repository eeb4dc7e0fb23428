// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::session::manager::SessionManager;
use crate::transport::auth::TokenValidator;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub manager: Arc<SessionManager>,
    pub token_validator: Arc<dyn TokenValidator>,
    pub shutdown: CancellationToken,
}
