// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error taxonomy for the gateway's plain HTTP surface and internal
/// fallible operations. The WebSocket path has its own `error` wire
/// message (see [`crate::events::ServerMessage::Error`]) and does not
/// go through HTTP status codes.
#[derive(Debug)]
pub enum GatewayError {
    Unauthorized,
    BadRequest(String),
    SessionNotFound,
    Internal(String),
}

impl GatewayError {
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::Unauthorized => 401,
            GatewayError::BadRequest(_) => 400,
            GatewayError::SessionNotFound => 404,
            GatewayError::Internal(_) => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::SessionNotFound => "SESSION_NOT_FOUND",
            GatewayError::Internal(_) => "INTERNAL",
        }
    }

    fn message(&self) -> String {
        match self {
            GatewayError::Unauthorized => "unauthorized".to_owned(),
            GatewayError::BadRequest(m) => m.clone(),
            GatewayError::SessionNotFound => "session not found".to_owned(),
            GatewayError::Internal(m) => m.clone(),
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: self.message() }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.message())
    }
}

impl std::error::Error for GatewayError {}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body() };
        (status, axum::Json(body)).into_response()
    }
}
