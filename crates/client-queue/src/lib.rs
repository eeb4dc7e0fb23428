// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, offline-tolerant client action queue. The mirror-image
//! correctness problem of the gateway's persistence writer: actions
//! created while offline are retried with exponential backoff and
//! flushed once connectivity returns.

mod queue;
mod store;

pub use queue::{ActionHandler, ActionQueue, QueueConfig};
pub use store::{ActionStore, InMemoryActionStore, QueuedAction, QueuedActionKind, QueuedActionStatus};
