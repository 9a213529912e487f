// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Human-in-the-loop permission gate.
//!
//! This is a request/response rendezvous, not a policy function: a tool call
//! that needs approval suspends its caller on a single-slot channel until a
//! UI resolves the request with [`Decision::AllowOnce`], [`Decision::AllowSession`]
//! (which also remembers the decision for the rest of the session), or
//! [`Decision::Deny`]. The decision travels back to the waiting caller
//! directly through that channel; the event bus is used only to announce that
//! a new request exists, never to carry the resolution.
//!
//! Session-scoped auto-approvals are checked first and, when present, skip
//! the rendezvous entirely.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use agentcore_bus::{ChangeKind, EventBus, PermissionRequestEvent};
use agentcore_store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AllowOnce,
    AllowSession,
    Deny,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: String,
    pub session_id: String,
    pub tool: String,
    pub path: Option<String>,
    pub summary: String,
}

#[derive(Clone)]
pub struct PermissionGate {
    store: Store,
    bus: Arc<EventBus>,
    waiters: Arc<Mutex<HashMap<String, oneshot::Sender<Decision>>>>,
    /// Per-session FIFO queue of request ids currently awaiting a decision.
    /// Never shared across sessions, so cancelling one session cannot touch
    /// another's pending requests.
    session_queues: Arc<Mutex<HashMap<String, VecDeque<PendingRequest>>>>,
}

impl PermissionGate {
    pub fn new(store: Store, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            waiters: Arc::new(Mutex::new(HashMap::new())),
            session_queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Request approval for a tool call. Returns `true` when the call may
    /// proceed. Blocks the caller until a decision arrives (or the session
    /// is cancelled), unless an auto-approval already covers this
    /// `(session_id, tool, path)` key.
    pub async fn request(
        &self,
        session_id: &str,
        tool: &str,
        path: Option<&str>,
        summary: impl Into<String>,
    ) -> Result<bool> {
        if self.store.is_auto_approved(session_id, tool, path).await? {
            return Ok(true);
        }

        let id = Uuid::new_v4().to_string();
        let pending = PendingRequest {
            id: id.clone(),
            session_id: session_id.to_string(),
            tool: tool.to_string(),
            path: path.map(String::from),
            summary: summary.into(),
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock().await;
            waiters.insert(id.clone(), tx);
        }
        {
            let mut queues = self.session_queues.lock().await;
            queues.entry(session_id.to_string()).or_default().push_back(pending);
        }

        self.bus.publish_permission_request(PermissionRequestEvent {
            kind: ChangeKind::Created,
            session_id: session_id.to_string(),
            request_id: id.clone(),
        });

        // A dropped sender (e.g. the gate is torn down mid-request) resolves
        // as Deny rather than hanging the caller forever.
        let decision = rx.await.unwrap_or(Decision::Deny);
        self.remove_from_queue(session_id, &id).await;

        match decision {
            Decision::AllowOnce => Ok(true),
            Decision::AllowSession => {
                self.store.add_auto_approval(session_id, tool, path).await?;
                Ok(true)
            }
            Decision::Deny => Ok(false),
        }
    }

    /// List pending requests for a session, oldest first — what a UI should
    /// render as the current approval queue.
    pub async fn pending_for_session(&self, session_id: &str) -> Vec<PendingRequest> {
        let queues = self.session_queues.lock().await;
        queues.get(session_id).map(|q| q.iter().cloned().collect()).unwrap_or_default()
    }

    /// Resolve a pending request. Returns `false` if no caller is (or is no
    /// longer) waiting on `request_id`.
    pub async fn resolve(&self, session_id: &str, request_id: &str, decision: Decision) -> bool {
        let tx = { self.waiters.lock().await.remove(request_id) };
        let Some(tx) = tx else { return false };
        let _ = tx.send(decision);
        self.remove_from_queue(session_id, request_id).await;
        true
    }

    /// Unblock every request pending for `session_id` with `Deny`. Used when
    /// a session is cancelled so its waiting tool calls do not hang forever.
    pub async fn cancel_session(&self, session_id: &str) {
        let ids: Vec<String> = {
            let mut queues = self.session_queues.lock().await;
            queues.remove(session_id).map(|q| q.into_iter().map(|p| p.id).collect()).unwrap_or_default()
        };
        let mut waiters = self.waiters.lock().await;
        for id in ids {
            if let Some(tx) = waiters.remove(&id) {
                let _ = tx.send(Decision::Deny);
            }
        }
    }

    async fn remove_from_queue(&self, session_id: &str, request_id: &str) {
        let mut queues = self.session_queues.lock().await;
        if let Some(queue) = queues.get_mut(session_id) {
            queue.retain(|p| p.id != request_id);
            if queue.is_empty() {
                queues.remove(session_id);
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
