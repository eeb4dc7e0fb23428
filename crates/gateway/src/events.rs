// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire message and session event schema. One JSON object per
//! WebSocket text frame; every object is tagged by `type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Provisioning,
    Starting,
    Running,
    Idle,
    Stopping,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    Client,
    Agent,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Web,
    Ios,
    Android,
    Desktop,
    Other,
}

/// One record in a session's ordered event log. `seq` is assigned by
/// the owning actor and is dense from 1 within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    pub seq: u64,
    pub direction: EventDirection,
    #[serde(flatten)]
    pub payload: SessionEventPayload,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum SessionEventPayload {
    OutputChunk { data: String, stream: OutputStream },
    MessageFinal { content: String, role: String },
    Input { data: String, #[serde(rename = "clientInputId")] client_input_id: String },
    ToolCall { #[serde(rename = "toolCallId")] tool_call_id: String, name: String, arguments: String },
    ToolResult { #[serde(rename = "toolCallId")] tool_call_id: String, result: String, #[serde(rename = "isError")] is_error: bool },
    State { status: SessionStatus, #[serde(rename = "previousStatus")] previous_status: Option<SessionStatus>, reason: Option<String> },
    Error { code: String, message: String },
    Heartbeat { #[serde(rename = "ts")] ts_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Messages a client sends to the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(rename = "deviceType")]
        device_type: DeviceType,
        token: String,
    },
    Subscribe {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "lastAckSeq")]
        last_ack_seq: u64,
    },
    Unsubscribe {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Input {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "clientInputId")]
        client_input_id: String,
        data: String,
    },
    Ack {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        seq: u64,
    },
    Ping { ts: u64 },
    CreateSession {
        #[serde(rename = "workingDirectory")]
        working_directory: String,
        #[serde(rename = "agentType")]
        agent_type: String,
        #[serde(rename = "worktreeId")]
        worktree_id: Option<String>,
        #[serde(rename = "repositoryId")]
        repository_id: Option<String>,
        title: Option<String>,
    },
    StopSession {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
}

/// Messages the gateway sends to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HelloOk {
        #[serde(rename = "gatewayTime")]
        gateway_time_ms: u64,
        #[serde(rename = "heartbeatIntervalMs")]
        heartbeat_interval_ms: u64,
        #[serde(rename = "userId")]
        user_id: String,
    },
    Subscribed {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "currentState")]
        current_state: SessionStatus,
        #[serde(rename = "latestSeq")]
        latest_seq: u64,
    },
    Unsubscribed {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    InputAck {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "clientInputId")]
        client_input_id: String,
        #[serde(rename = "acceptedSeq")]
        accepted_seq: u64,
    },
    Event {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(flatten)]
        event: SessionEvent,
    },
    Pong { ts: u64 },
    Error {
        code: String,
        message: String,
        #[serde(rename = "sessionId")]
        session_id: Option<Uuid>,
        retryable: bool,
    },
    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        status: SessionStatus,
    },
    SessionStopped {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>, retryable: bool) -> Self {
        ServerMessage::Error { code: code.to_owned(), message: message.into(), session_id: None, retryable }
    }

    pub fn session_error(code: &str, message: impl Into<String>, session_id: Uuid, retryable: bool) -> Self {
        ServerMessage::Error { code: code.to_owned(), message: message.into(), session_id: Some(session_id), retryable }
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
