// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! In-process event bus.
//!
//! One topic per entity kind (session, message, permission request, file
//! version). Each topic is a broadcast channel, which gives every topic its
//! own total order — "per-topic FIFO" falls out of that for free. There is no
//! back-pressure contract: publishers never block, and a subscriber that
//! falls behind silently drops the events it missed ([`broadcast::error::RecvError::Lagged`]),
//! which it should treat as "some events were missed, not frozen".
//!
//! Publish only after the write that produced the event has committed to the
//! store, so subscribers never observe a state change ahead of storage.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Channel capacity per topic. Chosen generously; a slow consumer drops old
/// events rather than stalling publishers (see module docs).
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: ChangeKind,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub kind: ChangeKind,
    pub session_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequestEvent {
    pub kind: ChangeKind,
    pub session_id: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersionEvent {
    pub kind: ChangeKind,
    pub session_id: String,
    pub path: String,
    pub version: u64,
}

/// Central pub/sub hub. Cheap to clone (every field is a broadcast sender,
/// which is itself a cheap `Arc` handle); share one instance across the
/// store, the permission gate, and the agent.
#[derive(Clone)]
pub struct EventBus {
    sessions: broadcast::Sender<SessionEvent>,
    messages: broadcast::Sender<MessageEvent>,
    permission_requests: broadcast::Sender<PermissionRequestEvent>,
    file_versions: broadcast::Sender<FileVersionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            sessions: broadcast::channel(CHANNEL_CAPACITY).0,
            messages: broadcast::channel(CHANNEL_CAPACITY).0,
            permission_requests: broadcast::channel(CHANNEL_CAPACITY).0,
            file_versions: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Publish never fails from the caller's perspective: an error here only
    /// means nobody is currently subscribed, which is a normal state.
    pub fn publish_session(&self, event: SessionEvent) {
        let _ = self.sessions.send(event);
    }

    pub fn publish_message(&self, event: MessageEvent) {
        let _ = self.messages.send(event);
    }

    pub fn publish_permission_request(&self, event: PermissionRequestEvent) {
        let _ = self.permission_requests.send(event);
    }

    pub fn publish_file_version(&self, event: FileVersionEvent) {
        let _ = self.file_versions.send(event);
    }

    pub fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.subscribe()
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MessageEvent> {
        self.messages.subscribe()
    }

    pub fn subscribe_permission_requests(&self) -> broadcast::Receiver<PermissionRequestEvent> {
        self.permission_requests.subscribe()
    }

    pub fn subscribe_file_versions(&self) -> broadcast::Receiver<FileVersionEvent> {
        self.file_versions.subscribe()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_session_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_sessions();
        bus.publish_session(SessionEvent { kind: ChangeKind::Created, session_id: "s1".into() });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.session_id, "s1");
        assert!(matches!(ev.kind, ChangeKind::Created));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error_or_block() {
        let bus = EventBus::new();
        bus.publish_message(MessageEvent {
            kind: ChangeKind::Created,
            session_id: "s1".into(),
            message_id: "m1".into(),
        });
    }

    #[tokio::test]
    async fn events_on_same_topic_preserve_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_messages();
        for i in 0..5 {
            bus.publish_message(MessageEvent {
                kind: ChangeKind::Updated,
                session_id: "s1".into(),
                message_id: format!("m{i}"),
            });
        }
        for i in 0..5 {
            let ev = rx.recv().await.unwrap();
            assert_eq!(ev.message_id, format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus = EventBus::new();
        let mut sessions_rx = bus.subscribe_sessions();
        bus.publish_message(MessageEvent {
            kind: ChangeKind::Created,
            session_id: "s1".into(),
            message_id: "m1".into(),
        });
        // No session event was published, so this must time out / have nothing ready.
        assert!(sessions_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe_permission_requests();
        let mut rx2 = bus.subscribe_permission_requests();
        bus.publish_permission_request(PermissionRequestEvent {
            kind: ChangeKind::Created,
            session_id: "s1".into(),
            request_id: "r1".into(),
        });
        assert_eq!(rx1.recv().await.unwrap().request_id, "r1");
        assert_eq!(rx2.recv().await.unwrap().request_id, "r1");
    }

    #[tokio::test]
    async fn file_version_event_roundtrip() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_file_versions();
        bus.publish_file_version(FileVersionEvent {
            kind: ChangeKind::Updated,
            session_id: "s1".into(),
            path: "src/main.rs".into(),
            version: 3,
        });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.version, 3);
        assert_eq!(ev.path, "src/main.rs");
    }
}
