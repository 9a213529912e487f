// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("could not resolve home directory for path '{0}'")]
    HomeDirUnresolved(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
