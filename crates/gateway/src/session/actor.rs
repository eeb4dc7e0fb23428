// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session actor: single owner of one session's sequence numbers,
//! recent-events buffer, and subscriber fan-out.
//!
//! Mutating operations are a single critical section guarded by one
//! `Mutex`. The actor never awaits the persistence writer or a
//! subscriber's socket while holding that lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::events::{now_ms, EventDirection, ServerMessage, SessionEvent, SessionEventPayload, SessionStatus};
use crate::persistence::PersistenceWriter;

/// One client's attachment to this session.
struct Subscriber {
    tx: mpsc::Sender<ServerMessage>,
    last_ack_seq: u64,
}

struct ActorState {
    status: SessionStatus,
    next_seq: u64,
    recent_events: VecDeque<SessionEvent>,
    subscribers: HashMap<String, Subscriber>,
    /// Bumped on every attach; the idle timer compares against the
    /// epoch it was armed with so a late-firing timer from a prior
    /// empty window is a no-op once someone has reattached.
    idle_epoch: u64,
}

/// Callback invoked whenever this session's status changes, so the
/// manager can react (e.g. release a lease once a session reaches a
/// terminal state).
pub type StatusChangeHook = Arc<dyn Fn(Uuid, SessionStatus) + Send + Sync>;

pub struct SessionActor {
    pub id: Uuid,
    pub user_id: String,
    state: Mutex<ActorState>,
    persistence: PersistenceWriter,
    max_recent_events: usize,
    idle_timeout: Duration,
    on_status_change: Option<StatusChangeHook>,
}

impl SessionActor {
    pub fn new(
        id: Uuid,
        user_id: String,
        initial_status: SessionStatus,
        next_seq: u64,
        persistence: PersistenceWriter,
        max_recent_events: usize,
        idle_timeout: Duration,
        on_status_change: Option<StatusChangeHook>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            user_id,
            state: Mutex::new(ActorState {
                status: initial_status,
                next_seq,
                recent_events: VecDeque::with_capacity(max_recent_events.min(256)),
                subscribers: HashMap::new(),
                idle_epoch: 0,
            }),
            persistence,
            max_recent_events,
            idle_timeout,
            on_status_change,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn latest_seq(&self) -> u64 {
        let state = self.lock();
        state.next_seq.saturating_sub(1)
    }

    /// Record and fan out one event, assigning it the next sequence
    /// number. Returns the assigned record.
    fn emit(&self, direction: EventDirection, payload: SessionEventPayload) -> SessionEvent {
        let (event, subscriber_sends) = {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            let event = SessionEvent { session_id: self.id, seq, direction, payload, created_at_ms: now_ms() };

            state.recent_events.push_back(event.clone());
            while state.recent_events.len() > self.max_recent_events {
                state.recent_events.pop_front();
            }

            let sends: Vec<_> = state
                .subscribers
                .values()
                .map(|sub| (sub.tx.clone(), ServerMessage::Event { session_id: self.id, event: event.clone() }))
                .collect();
            (event, sends)
        };

        self.persistence.enqueue(event.clone());

        for (tx, msg) in subscriber_sends {
            // A full or closed subscriber channel must not stall fan-out
            // to the rest; drop the message for that subscriber.
            let _ = tx.try_send(msg);
        }

        event
    }

    pub fn set_status(self: &Arc<Self>, new_status: SessionStatus, reason: Option<&str>) {
        let previous = {
            let mut state = self.lock();
            if state.status == new_status {
                return;
            }
            let previous = state.status;
            state.status = new_status;
            previous
        };

        self.emit(
            EventDirection::System,
            SessionEventPayload::State { status: new_status, previous_status: Some(previous), reason: reason.map(str::to_owned) },
        );

        if let Some(hook) = &self.on_status_change {
            hook(self.id, new_status);
        }

        if matches!(new_status, SessionStatus::Running) && matches!(previous, SessionStatus::Idle) {
            debug!(session_id = %self.id, "session resumed from idle");
        }
    }

    /// Attach a subscriber, sending it the `Subscribed` reply and its
    /// catch-up tail directly on its own channel before releasing the
    /// state lock. This keeps those messages ordered ahead of any
    /// event a concurrently-running `emit()` on another connection
    /// might fan out to the same subscriber. If the session was idle,
    /// wakes it back to running.
    pub fn attach_subscriber(self: &Arc<Self>, client_id: String, tx: mpsc::Sender<ServerMessage>, last_ack_seq: u64) {
        let was_idle = {
            let mut state = self.lock();
            state.idle_epoch += 1;
            let was_idle = state.status == SessionStatus::Idle;
            let reported_status = if was_idle { SessionStatus::Running } else { state.status };
            let latest_seq = state.next_seq.saturating_sub(1);
            let catch_up: Vec<SessionEvent> = state.recent_events.iter().filter(|e| e.seq > last_ack_seq).cloned().collect();

            let _ = tx.try_send(ServerMessage::Subscribed { session_id: self.id, current_state: reported_status, latest_seq });
            for event in catch_up {
                let _ = tx.try_send(ServerMessage::Event { session_id: self.id, event });
            }

            state.subscribers.insert(client_id, Subscriber { tx, last_ack_seq });
            was_idle
        };

        if was_idle {
            self.set_status(SessionStatus::Running, Some("subscriber_attached"));
        }
    }

    /// Detach a subscriber. If it was the last one and the session is
    /// running, arms the idle timer.
    pub fn detach_subscriber(self: &Arc<Self>, client_id: &str) {
        let should_arm_idle = {
            let mut state = self.lock();
            state.subscribers.remove(client_id);
            state.subscribers.is_empty() && state.status == SessionStatus::Running
        };

        if should_arm_idle {
            self.arm_idle_timer();
        }
    }

    fn arm_idle_timer(self: &Arc<Self>) {
        let epoch = {
            let mut state = self.lock();
            state.idle_epoch += 1;
            state.idle_epoch
        };
        let this = Arc::clone(self);
        let timeout = self.idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_idle_epoch = {
                let state = this.lock();
                state.subscribers.is_empty() && state.idle_epoch == epoch
            };
            if still_idle_epoch {
                this.set_status(SessionStatus::Idle, Some("no_subscribers_timeout"));
            }
        });
    }

    pub fn update_ack(&self, client_id: &str, seq: u64) {
        let mut state = self.lock();
        if let Some(sub) = state.subscribers.get_mut(client_id) {
            if seq > sub.last_ack_seq {
                sub.last_ack_seq = seq;
            }
        }
    }

    pub fn handle_input(self: &Arc<Self>, data: String, client_input_id: String) -> u64 {
        let event = self.emit(EventDirection::Client, SessionEventPayload::Input { data, client_input_id });
        event.seq
    }

    pub fn handle_agent_output(self: &Arc<Self>, data: String, stream: crate::events::OutputStream) {
        self.emit(EventDirection::Agent, SessionEventPayload::OutputChunk { data, stream });
    }

    pub fn handle_tool_call(self: &Arc<Self>, tool_call_id: String, name: String, arguments: String) {
        self.emit(EventDirection::Agent, SessionEventPayload::ToolCall { tool_call_id, name, arguments });
    }

    pub fn handle_tool_result(self: &Arc<Self>, tool_call_id: String, result: String, is_error: bool) {
        self.emit(EventDirection::Agent, SessionEventPayload::ToolResult { tool_call_id, result, is_error });
    }

    pub fn handle_agent_exit(self: &Arc<Self>, code: Option<i32>, signal: Option<String>) {
        let reason = match (code, &signal) {
            (_, Some(sig)) => format!("signal_{sig}"),
            (Some(0), None) => "exit_code_0".to_owned(),
            (Some(code), None) => format!("exit_code_{code}"),
            (None, None) => "unknown".to_owned(),
        };
        let status = if code == Some(0) && signal.is_none() { SessionStatus::Stopped } else { SessionStatus::Error };
        self.set_status(status, Some(&reason));
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn destroy(&self) {
        let mut state = self.lock();
        state.subscribers.clear();
        state.idle_epoch += 1;
    }
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
