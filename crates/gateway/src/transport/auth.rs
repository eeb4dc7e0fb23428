// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token resolution for the `hello` handshake, plus the HTTP bearer
//! check for the gateway's plain HTTP surface. Identity verification
//! itself is an external collaborator; the gateway only resolves an
//! opaque token to a user id through an injected [`TokenValidator`].

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Resolves a client-presented token to a user id. Auth/identity is
/// out of scope for the gateway core; a real deployment supplies its
/// own implementation. The static validator below exists for tests
/// and single-operator deployments.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Validates against one shared secret and resolves every valid
/// token to a single user id. Useful for local/dev deployments and
/// tests; mirrors the constant-time comparison used for the plain
/// HTTP bearer check.
pub struct StaticTokenValidator {
    expected: Option<String>,
    user_id: String,
}

impl StaticTokenValidator {
    pub fn new(expected: Option<String>, user_id: impl Into<String>) -> Self {
        Self { expected, user_id: user_id.into() }
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn resolve(&self, token: &str) -> Option<String> {
        match &self.expected {
            Some(expected) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => Some(self.user_id.clone()),
            None => Some(self.user_id.clone()),
            Some(_) => None,
        }
    }
}

/// Constant-time byte comparison so token checks don't leak timing
/// information through early-exit comparisons.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extract the bearer token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Axum middleware enforcing HTTP bearer auth on the plain HTTP
/// surface. Health and the WebSocket upgrade authenticate themselves
/// (or don't need to) and are exempt.
pub async fn auth_layer(state: State<GatewayState>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/api/v1/health" || path == "/ws" {
        return next.run(req).await;
    }

    let Some(expected) = state.config.auth_token.as_deref() else {
        return next.run(req).await;
    };

    match bearer_token(req.headers()) {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => next.run(req).await,
        _ => GatewayError::Unauthorized.into_response(),
    }
}
