// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! SQLite-backed persistence for sessions, messages, file versions and
//! per-session tool auto-approvals.
//!
//! Every mutating call commits to SQLite first and publishes the
//! corresponding [`agentcore_bus`] event only after the commit succeeds, so
//! subscribers never observe an event ahead of the state it describes.
//!
//! Streaming assistant content is coalesced: deltas are buffered in memory
//! and flushed to SQLite (and the bus) at most once per [`MERGE_WINDOW`],
//! with a hard [`MAX_LATENCY`] ceiling so a fast-typing stream never delays a
//! reader indefinitely. The transition to `finished` always flushes
//! immediately and is never merged with a later delta.

mod error;
mod schema;
mod types;

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

pub use error::StoreError;
pub use types::{FileVersionRecord, MessageRecord, SessionRecord};

use agentcore_bus::{ChangeKind, EventBus, FileVersionEvent, MessageEvent, SessionEvent};

const MERGE_WINDOW: Duration = Duration::from_millis(50);
const MAX_LATENCY: Duration = Duration::from_millis(200);

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Expand a leading `~` or `~/...` component against `dirs::home_dir()`.
/// Paths without a leading `~` are returned unchanged.
fn expand_tilde(path: &Path) -> Result<Cow<'_, Path>> {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| StoreError::HomeDirUnresolved(raw.to_string()))?;
        let expanded: PathBuf = if raw == "~" { home } else { home.join(&raw[2..]) };
        return Ok(Cow::Owned(expanded));
    }
    Ok(Cow::Borrowed(path))
}

struct PendingDelta {
    buffer: String,
    first_at: Instant,
}

/// Handle to the persistence layer. Cheap to clone; all mutable state lives
/// behind `Arc`s.
#[derive(Clone)]
pub struct Store {
    conn: Arc<StdMutex<Connection>>,
    bus: Arc<EventBus>,
    pending: Arc<Mutex<HashMap<String, PendingDelta>>>,
}

impl Store {
    /// Open (creating if necessary) the SQLite database at `path`. A leading
    /// `~` is expanded against the current user's home directory.
    pub fn open(path: impl AsRef<Path>, bus: Arc<EventBus>) -> Result<Self> {
        let expanded = expand_tilde(path.as_ref())?;
        let path = expanded.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database at {}", path.display()))?;
        schema::init(&conn).context("initialising database schema")?;
        Ok(Self { conn: Arc::new(StdMutex::new(conn)), bus, pending: Arc::new(Mutex::new(HashMap::new())) })
    }

    /// Open an in-memory database. Used by tests and by `--db-path :memory:`.
    pub fn open_in_memory(bus: Arc<EventBus>) -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        schema::init(&conn).context("initialising database schema")?;
        Ok(Self { conn: Arc::new(StdMutex::new(conn)), bus, pending: Arc::new(Mutex::new(HashMap::new())) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    pub async fn create_session(&self, parent_session_id: Option<String>) -> Result<SessionRecord> {
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            parent_session_id,
            title: None,
            created_at: now(),
            updated_at: now(),
            message_count: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: 0.0,
        };
        {
            let conn = self.lock();
            conn.execute(
                "INSERT INTO sessions (id, parent_session_id, title, created_at, updated_at, \
                 message_count, prompt_tokens, completion_tokens, cost_usd) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, 0.0)",
                params![record.id, record.parent_session_id, record.title, record.created_at, record.updated_at],
            )?;
        }
        self.bus.publish_session(SessionEvent { kind: ChangeKind::Created, session_id: record.id.clone() });
        Ok(record)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT id, parent_session_id, title, created_at, updated_at, \
                 message_count, prompt_tokens, completion_tokens, cost_usd FROM sessions WHERE id = ?1",
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        {
            let conn = self.lock();
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        }
        self.bus.publish_session(SessionEvent { kind: ChangeKind::Deleted, session_id: id.to_string() });
        Ok(())
    }

    /// List sessions most-recently-updated first.
    pub async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, parent_session_id, title, created_at, updated_at, \
             message_count, prompt_tokens, completion_tokens, cost_usd FROM sessions \
             ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_session)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn set_session_title(&self, id: &str, title: &str) -> Result<()> {
        {
            let conn = self.lock();
            let affected = conn.execute(
                "UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now(), id],
            )?;
            if affected == 0 {
                return Err(StoreError::SessionNotFound(id.to_string()).into());
            }
        }
        self.bus.publish_session(SessionEvent { kind: ChangeKind::Updated, session_id: id.to_string() });
        Ok(())
    }

    /// Add non-negative usage deltas to a session's running totals. Counters
    /// are monotonically non-decreasing by construction: negative deltas are
    /// clamped to zero rather than rejected, since a provider never reports
    /// negative usage for a completed turn.
    pub async fn record_usage(&self, id: &str, prompt_tokens: i64, completion_tokens: i64, cost_usd: f64) -> Result<()> {
        let prompt_tokens = prompt_tokens.max(0);
        let completion_tokens = completion_tokens.max(0);
        let cost_usd = cost_usd.max(0.0);
        {
            let conn = self.lock();
            let affected = conn.execute(
                "UPDATE sessions SET prompt_tokens = prompt_tokens + ?1, \
                 completion_tokens = completion_tokens + ?2, cost_usd = cost_usd + ?3, \
                 updated_at = ?4 WHERE id = ?5",
                params![prompt_tokens, completion_tokens, cost_usd, now(), id],
            )?;
            if affected == 0 {
                return Err(StoreError::SessionNotFound(id.to_string()).into());
            }
        }
        self.bus.publish_session(SessionEvent { kind: ChangeKind::Updated, session_id: id.to_string() });
        Ok(())
    }

    // ── Messages ──────────────────────────────────────────────────────────────

    pub async fn append_message(&self, session_id: &str, role: &str, content_json: &str, finished: bool) -> Result<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        let finished_at = if finished { Some(created_at.clone()) } else { None };
        {
            let conn = self.lock();
            let seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )?;
            conn.execute(
                "INSERT INTO messages (id, session_id, seq, role, content_json, created_at, finished_at, deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                params![id, session_id, seq, role, content_json, created_at, finished_at],
            )?;
            conn.execute(
                "UPDATE sessions SET message_count = message_count + 1, updated_at = ?1 WHERE id = ?2",
                params![created_at, session_id],
            )?;
            let record = MessageRecord {
                id: id.clone(),
                session_id: session_id.to_string(),
                seq,
                role: role.to_string(),
                content_json: content_json.to_string(),
                created_at,
                finished_at,
                deleted: false,
            };
            drop(conn);
            self.bus.publish_message(MessageEvent {
                kind: ChangeKind::Created,
                session_id: session_id.to_string(),
                message_id: id,
            });
            return Ok(record);
        }
    }

    /// Append a streaming content delta for a not-yet-finished message.
    /// Buffered and coalesced per [`MERGE_WINDOW`]/[`MAX_LATENCY`]; call
    /// [`Store::finish_message`] to flush immediately and mark complete.
    pub async fn append_content_delta(&self, session_id: &str, message_id: &str, delta: &str) -> Result<()> {
        let should_flush_now = {
            let mut pending = self.pending.lock().await;
            let entry = pending.entry(message_id.to_string()).or_insert_with(|| PendingDelta {
                buffer: String::new(),
                first_at: Instant::now(),
            });
            entry.buffer.push_str(delta);
            entry.first_at.elapsed() >= MAX_LATENCY
        };

        if should_flush_now {
            self.flush_delta(session_id, message_id).await?;
        } else {
            self.schedule_flush(session_id.to_string(), message_id.to_string());
        }
        Ok(())
    }

    fn schedule_flush(&self, session_id: String, message_id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(MERGE_WINDOW).await;
            if let Err(e) = this.flush_delta(&session_id, &message_id).await {
                warn!(error = %e, session_id, message_id, "failed to flush coalesced message delta");
            }
        });
    }

    async fn flush_delta(&self, session_id: &str, message_id: &str) -> Result<()> {
        let buffer = {
            let mut pending = self.pending.lock().await;
            match pending.remove(message_id) {
                Some(p) if !p.buffer.is_empty() => p.buffer,
                _ => return Ok(()),
            }
        };
        {
            let conn = self.lock();
            let existing: String = conn.query_row(
                "SELECT content_json FROM messages WHERE id = ?1",
                params![message_id],
                |r| r.get(0),
            )?;
            let merged = merge_text_delta(&existing, &buffer);
            conn.execute("UPDATE messages SET content_json = ?1 WHERE id = ?2", params![merged, message_id])?;
        }
        self.bus.publish_message(MessageEvent {
            kind: ChangeKind::Updated,
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    /// Flush any buffered delta immediately, set the final content and mark
    /// the message finished. This transition is never coalesced.
    pub async fn finish_message(&self, session_id: &str, message_id: &str, content_json: &str) -> Result<()> {
        {
            let mut pending = self.pending.lock().await;
            pending.remove(message_id);
        }
        {
            let conn = self.lock();
            let affected = conn.execute(
                "UPDATE messages SET content_json = ?1, finished_at = ?2 WHERE id = ?3",
                params![content_json, now(), message_id],
            )?;
            if affected == 0 {
                return Err(StoreError::MessageNotFound(message_id.to_string()).into());
            }
        }
        self.bus.publish_message(MessageEvent {
            kind: ChangeKind::Updated,
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, seq, role, content_json, created_at, finished_at, deleted \
             FROM messages WHERE session_id = ?1 AND deleted = 0 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![session_id], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Soft-delete a message. `message_count` is decremented so it continues
    /// to reflect the count of non-deleted messages.
    pub async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()> {
        {
            let conn = self.lock();
            let affected = conn.execute(
                "UPDATE messages SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                params![message_id],
            )?;
            if affected > 0 {
                conn.execute(
                    "UPDATE sessions SET message_count = message_count - 1 WHERE id = ?1",
                    params![session_id],
                )?;
            }
        }
        self.bus.publish_message(MessageEvent {
            kind: ChangeKind::Deleted,
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    // ── File versions ─────────────────────────────────────────────────────────

    pub async fn record_file_version(&self, session_id: &str, path: &str, content_hash: &str) -> Result<FileVersionRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        let version = {
            let conn = self.lock();
            let next: i64 = conn.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM files WHERE session_id = ?1 AND path = ?2",
                params![session_id, path],
                |r| r.get(0),
            )?;
            conn.execute(
                "INSERT INTO files (id, session_id, path, version, content_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, session_id, path, next, content_hash, created_at],
            )?;
            next
        };
        self.bus.publish_file_version(FileVersionEvent {
            kind: ChangeKind::Created,
            session_id: session_id.to_string(),
            path: path.to_string(),
            version: version as u64,
        });
        Ok(FileVersionRecord { id, session_id: session_id.to_string(), path: path.to_string(), version, content_hash: content_hash.to_string(), created_at })
    }

    pub async fn list_file_versions(&self, session_id: &str, path: &str) -> Result<Vec<FileVersionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, path, version, content_hash, created_at \
             FROM files WHERE session_id = ?1 AND path = ?2 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![session_id, path], row_to_file_version)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ── Auto-approvals ───────────────────────────────────────────────────────

    pub async fn is_auto_approved(&self, session_id: &str, tool: &str, path: Option<&str>) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM auto_approvals WHERE session_id = ?1 AND tool = ?2 AND path = ?3",
            params![session_id, tool, path.unwrap_or("")],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub async fn add_auto_approval(&self, session_id: &str, tool: &str, path: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO auto_approvals (session_id, tool, path) VALUES (?1, ?2, ?3)",
            params![session_id, tool, path.unwrap_or("")],
        )?;
        Ok(())
    }
}

fn merge_text_delta(existing: &str, delta: &str) -> String {
    // Content is stored as a JSON-encoded string (see agentcore-core's wire
    // format); the store treats it as opaque and simply concatenates the raw
    // bytes, which is correct for the common case of a single streamed text
    // part re-serialized on every flush by the caller before this is invoked.
    format!("{existing}{delta}")
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        parent_session_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        message_count: row.get(5)?,
        prompt_tokens: row.get(6)?,
        completion_tokens: row.get(7)?,
        cost_usd: row.get(8)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        seq: row.get(2)?,
        role: row.get(3)?,
        content_json: row.get(4)?,
        created_at: row.get(5)?,
        finished_at: row.get(6)?,
        deleted: row.get::<_, i64>(7)? != 0,
    })
}

fn row_to_file_version(row: &rusqlite::Row) -> rusqlite::Result<FileVersionRecord> {
    Ok(FileVersionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        path: row.get(2)?,
        version: row.get(3)?,
        content_hash: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
