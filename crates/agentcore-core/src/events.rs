// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use agentcore_tools::ToolCall;

/// Terminal marker for how an assistant turn ended, mirrored onto the last
/// content part of the finished message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Canceled,
    Error,
    PermissionDenied,
}

/// Error taxonomy kind attached to a surfaced (non-recovered) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Auth,
    ContextOverflow,
    MalformedToolCall,
    ToolTimeout,
    ToolFailure,
    PermissionDenied,
    Canceled,
    LoopLimit,
}

/// Events emitted by the agent during a single `run`. Consumers (CLI, UI)
/// drive their live output from this stream; durable state always lives in
/// the store, which is published to separately via `agentcore-bus`.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model.
    TextDelta(String),
    /// A thinking/reasoning chunk from the model.
    ThinkingDelta(String),
    /// The model has requested a tool call.
    ToolCallStarted(ToolCall),
    /// A tool call finished.
    ToolCallFinished { call_id: String, tool_name: String, output: String, is_error: bool },
    /// Context was compacted; statistics for the UI.
    ContextCompacted { tokens_before: usize, tokens_after: usize },
    /// Usage reported for the most recent provider call.
    TokenUsage { input: u32, output: u32, cache_read: u32, cache_write: u32 },
    /// The current turn ended with the given reason.
    TurnComplete(FinishReason),
    /// A surfaced, non-recoverable error.
    Error { kind: ErrorKind, message: String },
}
