// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System prompt construction.
//!
//! The stable portion of the prompt (these guidelines) is kept separate from
//! per-turn volatile context, which callers pass through
//! [`agentcore_model::CompletionRequest::system_dynamic_suffix`] instead of
//! baking it in here, so the provider's prompt cache hits the same prefix
//! across every turn of a session.

const BASE_GUIDELINES: &str = "\
You are an autonomous coding assistant running inside a terminal. You have \
access to tools for reading and editing files, searching a codebase, running \
shell commands, and fetching web pages. Tools that mutate state or run \
arbitrary commands require the user's permission before they execute; if a \
request is denied, acknowledge it and continue without the mutation.

Prefer the smallest set of tool calls that accomplishes the task. When \
editing files, make the old_string you match unique enough to apply \
unambiguously. When a task is open-ended or spans many independent \
subtasks, consider delegating a well-scoped piece of it to the sub-agent \
tool rather than doing everything in one turn.

Stop and respond in plain text once the user's request is satisfied; do not \
keep calling tools after the answer is already known.";

/// Build the primary agent's system prompt. `override_prompt` replaces the
/// built-in guidelines entirely when set (from `AgentConfig::system_prompt`).
pub fn system_prompt(override_prompt: Option<&str>) -> String {
    override_prompt.unwrap_or(BASE_GUIDELINES).to_string()
}

/// One-shot prompt used by the title side-task.
pub fn title_prompt(user_text: &str) -> String {
    format!(
        "Summarise the following user request as a short conversation title, \
         at most 50 characters, no surrounding quotes, no trailing period:\n\n{user_text}"
    )
}

/// Trim a model-generated title to the 50-character contract, on a char
/// boundary, stripping surrounding quotes the model sometimes adds anyway.
pub fn sanitize_title(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"').trim_matches('\'').trim();
    if trimmed.chars().count() <= 50 {
        trimmed.to_string()
    } else {
        trimmed.chars().take(50).collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
