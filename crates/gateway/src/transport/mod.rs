// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod auth;
pub mod ws;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::GatewayError;
use crate::events::SessionStatus;
use crate::state::GatewayState;
use crate::storage::NewSession;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    session_count: usize,
}

async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", session_count: state.manager.count().await })
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    working_directory: String,
    agent_type: String,
    worktree_id: Option<String>,
    repository_id: Option<String>,
    title: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: uuid::Uuid,
    status: SessionStatus,
}

/// HTTP convenience for creating a session without opening a
/// WebSocket first. Functionally equivalent to the `create_session`
/// wire message; a client still has to connect and `subscribe` over
/// WS to receive events.
async fn create_session_http(State(state): State<GatewayState>, headers: HeaderMap, Json(body): Json<CreateSessionRequest>) -> Result<Json<CreateSessionResponse>, GatewayError> {
    let token = auth::bearer_token(&headers).ok_or(GatewayError::Unauthorized)?;
    let user_id = state.token_validator.resolve(token).await.ok_or(GatewayError::Unauthorized)?;

    if body.working_directory.trim().is_empty() {
        return Err(GatewayError::BadRequest("working_directory must not be empty".to_owned()));
    }

    let cfg = NewSession {
        user_id,
        agent_type: body.agent_type,
        working_directory: body.working_directory,
        worktree_id: body.worktree_id,
        repository_id: body.repository_id,
        title: body.title,
    };

    let actor = state.manager.create_session(cfg).await.map_err(|err| GatewayError::Internal(err.to_string()))?;
    Ok(Json(CreateSessionResponse { session_id: actor.id, status: actor.status() }))
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/sessions", post(create_session_http))
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
