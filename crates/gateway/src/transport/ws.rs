// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WebSocket protocol state machine: `Unauthenticated` until a
//! valid `hello`, then `Ready` for the rest of the connection's
//! lifetime.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{now_ms, ClientMessage, ServerMessage};
use crate::state::GatewayState;
use crate::storage::NewSession;

const OUTBOUND_BUFFER: usize = 256;

pub async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

struct ConnectionCtx {
    client_id: String,
    user_id: String,
    subscribed: HashSet<Uuid>,
}

async fn handle_ws(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

    let Some(mut ctx) = authenticate(&mut stream, &out_tx, &state).await else {
        flush_and_close(&mut sink, &mut out_rx).await;
        return;
    };

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if send(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_ready_message(&text, &mut ctx, &out_tx, &state).await.is_break() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    cleanup_connection(&ctx, &state).await;
}

async fn authenticate(stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin), out_tx: &mpsc::Sender<ServerMessage>, state: &GatewayState) -> Option<ConnectionCtx> {
    let first = stream.next().await?;
    let text = match first {
        Ok(Message::Text(text)) => text,
        _ => {
            let _ = out_tx.send(ServerMessage::error("BAD_MESSAGE", "expected hello", false)).await;
            return None;
        }
    };

    let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
    let ClientMessage::Hello { client_id, token, .. } = (match parsed {
        Ok(msg) => msg,
        Err(err) => {
            let _ = out_tx.send(ServerMessage::error("BAD_MESSAGE", err.to_string(), false)).await;
            return None;
        }
    }) else {
        let _ = out_tx.send(ServerMessage::error("PROTOCOL_ERROR", "first message must be hello", false)).await;
        return None;
    };

    let Some(user_id) = state.token_validator.resolve(&token).await else {
        let _ = out_tx.send(ServerMessage::error("UNAUTHORIZED", "invalid token", false)).await;
        return None;
    };

    let _ = out_tx
        .send(ServerMessage::HelloOk { gateway_time_ms: now_ms(), heartbeat_interval_ms: state.config.heartbeat_interval_ms, user_id: user_id.clone() })
        .await;

    Some(ConnectionCtx { client_id, user_id, subscribed: HashSet::new() })
}

enum Flow {
    Continue,
    Break,
}

impl Flow {
    fn is_break(&self) -> bool {
        matches!(self, Flow::Break)
    }
}

async fn handle_ready_message(text: &str, ctx: &mut ConnectionCtx, out_tx: &mpsc::Sender<ServerMessage>, state: &GatewayState) -> Flow {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    let msg = match parsed {
        Ok(msg) => msg,
        Err(err) => {
            let _ = out_tx.send(ServerMessage::error("BAD_MESSAGE", err.to_string(), false)).await;
            return Flow::Break;
        }
    };

    match msg {
        ClientMessage::Hello { .. } => {
            let _ = out_tx.send(ServerMessage::error("PROTOCOL_ERROR", "already authenticated", true)).await;
        }
        ClientMessage::Subscribe { session_id, last_ack_seq } => {
            handle_subscribe(session_id, last_ack_seq, ctx, out_tx, state).await;
        }
        ClientMessage::Unsubscribe { session_id } => {
            if let Some(actor) = state.manager.get(session_id).await {
                actor.detach_subscriber(&ctx.client_id);
            }
            ctx.subscribed.remove(&session_id);
            let _ = out_tx.send(ServerMessage::Unsubscribed { session_id }).await;
        }
        ClientMessage::Input { session_id, client_input_id, data } => {
            match state.manager.get(session_id).await {
                Some(actor) => {
                    let seq = actor.handle_input(data, client_input_id.clone());
                    let _ = out_tx.send(ServerMessage::InputAck { session_id, client_input_id, accepted_seq: seq }).await;
                }
                None => {
                    let _ = out_tx.send(ServerMessage::session_error("SESSION_NOT_FOUND", "unknown session", session_id, false)).await;
                }
            }
        }
        ClientMessage::Ack { session_id, seq } => {
            if let Some(actor) = state.manager.get(session_id).await {
                actor.update_ack(&ctx.client_id, seq);
            }
        }
        ClientMessage::Ping { ts } => {
            let _ = out_tx.send(ServerMessage::Pong { ts }).await;
        }
        ClientMessage::CreateSession { working_directory, agent_type, worktree_id, repository_id, title } => {
            let cfg = NewSession { user_id: ctx.user_id.clone(), agent_type, working_directory, worktree_id, repository_id, title };
            match state.manager.create_session(cfg).await {
                Ok(actor) => {
                    let _ = out_tx.send(ServerMessage::SessionCreated { session_id: actor.id, status: actor.status() }).await;
                }
                Err(err) => {
                    warn!(error = %err, "create_session failed");
                    let _ = out_tx.send(ServerMessage::error("INTERNAL", "failed to create session", true)).await;
                }
            }
        }
        ClientMessage::StopSession { session_id } => {
            if let Some(actor) = state.manager.get(session_id).await {
                actor.set_status(crate::events::SessionStatus::Stopping, Some("client_requested"));
            }
            let _ = out_tx.send(ServerMessage::SessionStopped { session_id }).await;
        }
    }

    Flow::Continue
}

async fn handle_subscribe(session_id: Uuid, last_ack_seq: u64, ctx: &mut ConnectionCtx, out_tx: &mpsc::Sender<ServerMessage>, state: &GatewayState) {
    let actor = match state.manager.get_or_load_session(session_id).await {
        Ok(Some(actor)) => actor,
        Ok(None) => {
            let _ = out_tx.send(ServerMessage::session_error("SESSION_NOT_FOUND", "unknown session", session_id, false)).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, session_id = %session_id, "failed to load session");
            let _ = out_tx.send(ServerMessage::session_error("INTERNAL", "failed to load session", session_id, true)).await;
            return;
        }
    };

    actor.attach_subscriber(ctx.client_id.clone(), out_tx.clone(), last_ack_seq);
    ctx.subscribed.insert(session_id);
}

async fn cleanup_connection(ctx: &ConnectionCtx, state: &GatewayState) {
    for session_id in &ctx.subscribed {
        if let Some(actor) = state.manager.get(*session_id).await {
            actor.detach_subscriber(&ctx.client_id);
        }
    }
}

async fn send(sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin), msg: &ServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_else(|_| r#"{"type":"error","code":"INTERNAL","message":"serialize failure","retryable":true}"#.to_owned());
    sink.send(Message::Text(text.into())).await
}

async fn flush_and_close(sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin), out_rx: &mut mpsc::Receiver<ServerMessage>) {
    while let Ok(msg) = out_rx.try_recv() {
        let _ = send(sink, &msg).await;
    }
    let _ = sink.send(Message::Close(None)).await;
}
