// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub parent_session_id: Option<String>,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub seq: i64,
    /// Role string mirroring `agentcore_model::Role` ("system"/"user"/"assistant"/"tool").
    /// Kept as a plain string so this crate does not depend on agentcore-model.
    pub role: String,
    /// Opaque serialized content — the store never interprets it.
    pub content_json: String,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileVersionRecord {
    pub id: String,
    pub session_id: String,
    pub path: String,
    pub version: i64,
    pub content_hash: String,
    pub created_at: String,
}
