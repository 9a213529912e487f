// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The inference loop: turns one user message into a stream of
//! [`AgentEvent`]s, durably persisting every message it produces and
//! dispatching tool calls through the permission gate.
//!
//! One [`Agent`] is built per role (primary, delegated sub-agent, title) —
//! it is not mode-switching. A sub-agent is a second `Agent` instance built
//! with a reduced [`ToolRegistry`], not a flag on this one. The title
//! side-task is the exception: it shares the primary agent's plumbing but
//! runs a second, tool-free model as a detached task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentcore_config::AgentConfig;
use agentcore_model::{
    sanitize::strip_images_if_unsupported, CompletionRequest, FunctionCall, Message,
    MessageContent, ModelProvider, ResponseEvent, Role, ToolContentPart, ToolSchema,
};
use agentcore_permission::PermissionGate;
use agentcore_store::{MessageRecord, Store};
use agentcore_tools::{ApprovalPolicy, OutputCategory, Tool, ToolPolicy, ToolRegistry};
use anyhow::{bail, Context, Result};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::compact::{emergency_compact, smart_truncate};
use crate::events::{AgentEvent, ErrorKind, FinishReason};
use crate::prompts::{sanitize_title, system_prompt, title_prompt};
use crate::session::SessionHistory;

/// Event stream returned by [`Agent::run`]. Closes when the turn reaches a
/// terminal finish reason; the durable record of what happened lives in the
/// store, not in this stream.
pub type AgentEventStream = std::pin::Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

#[derive(Clone)]
pub struct Agent {
    store: Store,
    gate: Arc<PermissionGate>,
    tools: Arc<ToolRegistry>,
    policy: Arc<ToolPolicy>,
    model: Arc<dyn ModelProvider>,
    title: Option<Arc<dyn ModelProvider>>,
    config: AgentConfig,
    busy: Arc<Mutex<HashSet<String>>>,
    cancels: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
}

impl Agent {
    pub fn new(
        store: Store,
        gate: Arc<PermissionGate>,
        tools: Arc<ToolRegistry>,
        policy: Arc<ToolPolicy>,
        model: Arc<dyn ModelProvider>,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            gate,
            tools,
            policy,
            model,
            title: None,
            config,
            busy: Arc::new(Mutex::new(HashSet::new())),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach the title side-task's model. Only the primary agent should
    /// carry this — a delegated sub-agent's sessions never get a title of
    /// their own.
    pub fn with_title_task(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.title = Some(model);
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn is_busy(&self, session_id: &str) -> bool {
        self.busy.lock().await.contains(session_id)
    }

    /// Request cancellation of the run in progress for `session_id`, if any.
    /// No-op when nothing is running. Unblocks any permission wait for this
    /// session so a cancelled run never hangs on human input.
    pub async fn cancel(&self, session_id: &str) {
        if let Some(tx) = self.cancels.lock().await.get(session_id) {
            let _ = tx.send(true);
        }
        self.gate.cancel_session(session_id).await;
    }

    /// Run one user turn to completion, streaming events as they occur.
    /// Rejects with an error if the session already has a run in flight.
    pub async fn run(&self, session_id: &str, user_text: &str) -> Result<AgentEventStream> {
        {
            let mut busy = self.busy.lock().await;
            if busy.contains(session_id) {
                bail!("session {session_id} already has a run in progress");
            }
            busy.insert(session_id.to_string());
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels.lock().await.insert(session_id.to_string(), cancel_tx);

        let (tx, rx) = mpsc::channel(256);
        let this = self.clone();
        let session_id = session_id.to_string();
        let user_text = user_text.to_string();
        tokio::spawn(async move {
            this.run_inner(&session_id, &user_text, &tx, cancel_rx).await;
            this.busy.lock().await.remove(&session_id);
            this.cancels.lock().await.remove(&session_id);
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn run_inner(
        &self,
        session_id: &str,
        user_text: &str,
        tx: &mpsc::Sender<AgentEvent>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        if let Err(e) = self.run_inner_fallible(session_id, user_text, tx, &mut cancel_rx).await {
            warn!(session_id, error = %e, "run terminated with an unhandled error");
            let _ = tx.send(AgentEvent::Error { kind: ErrorKind::Transport, message: e.to_string() }).await;
        }
    }

    async fn run_inner_fallible(
        &self,
        session_id: &str,
        user_text: &str,
        tx: &mpsc::Sender<AgentEvent>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .with_context(|| format!("session {session_id} does not exist"))?;
        let is_first_message = session.message_count == 0;

        let max_tokens = self.model.catalog_context_window().unwrap_or(DEFAULT_CONTEXT_WINDOW as u32) as usize;
        let mut history = SessionHistory::new(session_id, max_tokens);
        history.push(Message::system(system_prompt(self.config.system_prompt.as_deref())));
        for record in self.store.list_messages(session_id).await?.into_iter() {
            history.push(record_to_message(&record)?);
        }

        let user_msg = Message::user(user_text);
        self.store
            .append_message(session_id, "user", &serde_json::to_string(&user_msg.content)?, true)
            .await?;
        history.push(user_msg);

        if is_first_message && session.parent_session_id.is_none() {
            self.spawn_title_task(session_id, user_text);
        }

        self.maybe_compact(&mut history, tx).await;

        let run_timeout = self.config.max_run_timeout_secs;
        let run_fut = self.agentic_loop(session_id, &mut history, tx, cancel_rx);
        if run_timeout > 0 {
            match tokio::time::timeout(std::time::Duration::from_secs(run_timeout), run_fut).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = tx
                        .send(AgentEvent::Error {
                            kind: ErrorKind::Transport,
                            message: format!("run exceeded {run_timeout}s timeout"),
                        })
                        .await;
                    Ok(())
                }
            }
        } else {
            run_fut.await
        }
    }

    async fn maybe_compact(&self, history: &mut SessionHistory, tx: &mpsc::Sender<AgentEvent>) {
        if !history.is_near_limit(self.config.compaction_threshold) {
            return;
        }
        let before = history.token_count;
        emergency_compact(&mut history.messages, None, self.config.compaction_keep_recent);
        history.recalculate_tokens();
        let _ = tx
            .send(AgentEvent::ContextCompacted { tokens_before: before, tokens_after: history.token_count })
            .await;
    }

    async fn agentic_loop(
        &self,
        session_id: &str,
        history: &mut SessionHistory,
        tx: &mpsc::Sender<AgentEvent>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let schemas: Vec<ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| ToolSchema { name: s.name, description: s.description, parameters: s.parameters })
            .collect();

        let mut round: u32 = 0;
        loop {
            if *cancel_rx.borrow() {
                return self.finish_canceled(session_id, history, tx).await;
            }

            round += 1;
            if round > self.config.max_tool_rounds {
                let _ = tx.send(AgentEvent::TurnComplete(FinishReason::Error)).await;
                let _ = tx
                    .send(AgentEvent::Error {
                        kind: ErrorKind::LoopLimit,
                        message: format!("exceeded {} tool-call rounds", self.config.max_tool_rounds),
                    })
                    .await;
                return Ok(());
            }

            let step_fut = self.run_one_step(session_id, history, &schemas, tx, cancel_rx);
            let outcome = if self.config.max_step_timeout_secs > 0 {
                match tokio::time::timeout(
                    std::time::Duration::from_secs(self.config.max_step_timeout_secs),
                    step_fut,
                )
                .await
                {
                    Ok(r) => r?,
                    Err(_) => {
                        let _ = tx.send(AgentEvent::TurnComplete(FinishReason::Error)).await;
                        let _ = tx
                            .send(AgentEvent::Error {
                                kind: ErrorKind::Transport,
                                message: format!("step exceeded {}s timeout", self.config.max_step_timeout_secs),
                            })
                            .await;
                        return Ok(());
                    }
                }
            } else {
                step_fut.await?
            };

            match outcome {
                StepOutcome::Done(reason) => {
                    let _ = tx.send(AgentEvent::TurnComplete(reason)).await;
                    return Ok(());
                }
                StepOutcome::Canceled => {
                    return self.finish_canceled(session_id, history, tx).await;
                }
                StepOutcome::ContinueWithTools => {
                    let _ = tx.send(AgentEvent::TurnComplete(FinishReason::ToolUse)).await;
                }
            }
        }
    }

    /// Run one model turn: stream the completion, persist whatever text or
    /// tool calls it produced, and — for tool calls — dispatch them and
    /// persist their results before returning.
    async fn run_one_step(
        &self,
        session_id: &str,
        history: &mut SessionHistory,
        schemas: &[ToolSchema],
        tx: &mpsc::Sender<AgentEvent>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<StepOutcome> {
        let modalities = self.model.input_modalities();
        let messages = strip_images_if_unsupported(history.messages.clone(), &modalities);
        let req = CompletionRequest {
            messages,
            tools: schemas.to_vec(),
            stream: true,
            system_dynamic_suffix: None,
            cache_key: Some(session_id.to_string()),
        };

        let stream = tokio::select! {
            biased;
            _ = cancel_rx.changed() => return Ok(StepOutcome::Canceled),
            result = self.model.complete(req) => result,
        };
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                let _ = tx
                    .send(AgentEvent::Error { kind: ErrorKind::Transport, message: e.to_string() })
                    .await;
                return Ok(StepOutcome::Done(FinishReason::Error));
            }
        };

        let mut full_text = String::new();
        let mut text_msg_id: Option<String> = None;
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();
        let mut saw_max_tokens = false;
        let mut transport_error: Option<String> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel_rx.changed() => break,
                event = stream.next() => event,
            };
            let Some(event) = next else { break };
            match event {
                Ok(ResponseEvent::TextDelta(delta)) if !delta.is_empty() => {
                    if text_msg_id.is_none() {
                        let row = self.store.append_message(session_id, "assistant", "", false).await?;
                        text_msg_id = Some(row.id);
                    }
                    if let Some(id) = &text_msg_id {
                        self.store.append_content_delta(session_id, id, &delta).await?;
                    }
                    full_text.push_str(&delta);
                    let _ = tx.send(AgentEvent::TextDelta(delta)).await;
                }
                Ok(ResponseEvent::TextDelta(_)) => {}
                Ok(ResponseEvent::ThinkingDelta(delta)) => {
                    let _ = tx.send(AgentEvent::ThinkingDelta(delta)).await;
                }
                Ok(ResponseEvent::ToolCall { index, id, name, arguments }) => {
                    let ptc = pending.entry(index).or_default();
                    if !id.is_empty() {
                        ptc.id = id;
                    }
                    if !name.is_empty() {
                        ptc.name = name;
                    }
                    ptc.args_buf.push_str(&arguments);
                }
                Ok(ResponseEvent::MaxTokens) => saw_max_tokens = true,
                Ok(ResponseEvent::Usage { input_tokens, output_tokens, cache_read_tokens, cache_write_tokens }) => {
                    let _ = self
                        .store
                        .record_usage(session_id, input_tokens as i64, output_tokens as i64, 0.0)
                        .await;
                    let _ = tx
                        .send(AgentEvent::TokenUsage {
                            input: input_tokens,
                            output: output_tokens,
                            cache_read: cache_read_tokens,
                            cache_write: cache_write_tokens,
                        })
                        .await;
                }
                Ok(ResponseEvent::Done) => break,
                Ok(ResponseEvent::Error(msg)) => {
                    warn!(session_id, %msg, "provider reported a recoverable stream error");
                }
                Err(e) => {
                    transport_error = Some(e.to_string());
                    break;
                }
            }
        }

        if *cancel_rx.borrow() {
            if let Some(id) = &text_msg_id {
                self.store
                    .finish_message(session_id, id, &serde_json::to_string(&MessageContent::Text(full_text.clone()))?)
                    .await?;
                history.push(Message::assistant(full_text));
            }
            return Ok(StepOutcome::Canceled);
        }

        if let Some(msg) = transport_error {
            if let Some(id) = &text_msg_id {
                self.store
                    .finish_message(session_id, id, &serde_json::to_string(&MessageContent::Text(full_text.clone()))?)
                    .await?;
                history.push(Message::assistant(full_text));
            }
            let _ = tx.send(AgentEvent::Error { kind: ErrorKind::Transport, message: msg }).await;
            return Ok(StepOutcome::Done(FinishReason::Error));
        }

        let tool_calls = finalize_tool_calls(pending);

        if let Some(id) = &text_msg_id {
            self.store
                .finish_message(session_id, id, &serde_json::to_string(&MessageContent::Text(full_text.clone()))?)
                .await?;
            history.push(Message::assistant(full_text.clone()));
        }

        if tool_calls.is_empty() {
            let reason = if saw_max_tokens { FinishReason::MaxTokens } else { FinishReason::EndTurn };
            return Ok(StepOutcome::Done(reason));
        }

        self.dispatch_tool_calls(session_id, history, tool_calls, tx, cancel_rx).await?;
        if *cancel_rx.borrow() {
            return Ok(StepOutcome::Canceled);
        }
        Ok(StepOutcome::ContinueWithTools)
    }

    /// Persist one assistant `ToolCall` message per call, run them all
    /// concurrently, then persist one tool-role `ToolResult` message per
    /// call in the order the model declared them — never the order they
    /// finish in.
    async fn dispatch_tool_calls(
        &self,
        session_id: &str,
        history: &mut SessionHistory,
        calls: Vec<ResolvedToolCall>,
        tx: &mpsc::Sender<AgentEvent>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        for call in &calls {
            let function = FunctionCall { name: call.name.clone(), arguments: call.raw_args.clone() };
            let content = MessageContent::ToolCall { tool_call_id: call.id.clone(), function };
            self.store.append_message(session_id, "assistant", &serde_json::to_string(&content)?, true).await?;
            history.push(Message { role: Role::Assistant, content });
        }

        let mut handles = Vec::with_capacity(calls.len());
        for call in calls {
            let agent = self.clone();
            let session_id = session_id.to_string();
            let tx = tx.clone();
            let mut cancel_rx = cancel_rx.clone();
            handles.push(tokio::spawn(async move {
                agent.run_single_tool(&session_id, call, &tx, &mut cancel_rx).await
            }));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            outputs.push(handle.await.context("tool task panicked")?);
        }

        for (call_id, tool_name, category, output) in outputs {
            let is_error = output.is_error;
            let msg = if output.has_images() {
                let parts: Vec<ToolContentPart> = output
                    .parts
                    .iter()
                    .map(|p| match p {
                        agentcore_tools::ToolOutputPart::Text(t) => ToolContentPart::Text {
                            text: smart_truncate(t, category, self.config.tool_result_token_cap),
                        },
                        agentcore_tools::ToolOutputPart::Image(url) => ToolContentPart::Image { image_url: url.clone() },
                    })
                    .collect();
                Message::tool_result_with_parts(call_id.clone(), parts)
            } else {
                Message::tool_result(call_id.clone(), smart_truncate(&output.content, category, self.config.tool_result_token_cap))
            };
            self.store
                .append_message(session_id, "tool", &serde_json::to_string(&msg.content)?, true)
                .await?;
            history.push(msg);
            let _ = tx
                .send(AgentEvent::ToolCallFinished { call_id, tool_name, output: output.content, is_error })
                .await;
        }
        Ok(())
    }

    async fn run_single_tool(
        &self,
        session_id: &str,
        call: ResolvedToolCall,
        tx: &mpsc::Sender<AgentEvent>,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> (String, String, OutputCategory, agentcore_tools::ToolOutput) {
        let tool_call = agentcore_tools::ToolCall { id: call.id.clone(), name: call.name.clone(), args: call.args.clone() };
        let _ = tx.send(AgentEvent::ToolCallStarted(tool_call.clone())).await;

        if call.malformed {
            let out = agentcore_tools::ToolOutput::err(&call.id, "malformed tool call arguments");
            return (call.id, call.name, OutputCategory::Generic, out);
        }

        let Some(tool) = self.tools.get(&call.name) else {
            let out = agentcore_tools::ToolOutput::err(&call.id, format!("unknown tool: {}", call.name));
            return (call.id, call.name, OutputCategory::Generic, out);
        };
        let category = tool.output_category();

        if tool.requires_permission() {
            let key = tool.permission_path(&tool_call);
            let decide_on = key.clone().unwrap_or_else(|| call.name.clone());
            match self.policy.decide(&decide_on) {
                ApprovalPolicy::Deny => {
                    let out = agentcore_tools::ToolOutput::err(&call.id, "permission denied");
                    return (call.id, call.name, category, out);
                }
                ApprovalPolicy::Auto => {}
                ApprovalPolicy::Ask => {
                    let summary = format!("{} {}", call.name, key.clone().unwrap_or_default());
                    let allowed = self
                        .gate
                        .request(session_id, &call.name, key.as_deref(), summary)
                        .await
                        .unwrap_or(false);
                    if !allowed {
                        let out = agentcore_tools::ToolOutput::err(&call.id, "permission denied");
                        return (call.id, call.name, category, out);
                    }
                }
            }
        }

        if *cancel_rx.borrow() {
            let out = agentcore_tools::ToolOutput::err(&call.id, "request cancelled");
            return (call.id, call.name, category, out);
        }

        let tool_clone = tool.clone();
        let exec_call = tool_call.clone();
        let handle = tokio::spawn(async move { tool_clone.execute(&exec_call).await });
        let out = tokio::select! {
            biased;
            _ = cancel_rx.changed() => agentcore_tools::ToolOutput::err(&call.id, "request cancelled"),
            result = handle => result.unwrap_or_else(|_| agentcore_tools::ToolOutput::err(&call.id, "tool task panicked")),
        };
        (call.id, call.name, category, out)
    }

    /// Finish the run after a mid-turn cancellation: whatever tool calls
    /// were already persisted get a synthetic "request cancelled" result if
    /// they have none yet, and the run ends with `FinishReason::Canceled`.
    async fn finish_canceled(
        &self,
        session_id: &str,
        history: &mut SessionHistory,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        self.gate.cancel_session(session_id).await;
        let outstanding = unmatched_tool_call_ids(&history.messages);
        for call_id in outstanding {
            let msg = Message::tool_result(call_id.clone(), "request cancelled");
            self.store.append_message(session_id, "tool", &serde_json::to_string(&msg.content)?, true).await?;
            history.push(msg);
            let _ = tx
                .send(AgentEvent::ToolCallFinished {
                    call_id,
                    tool_name: String::new(),
                    output: "request cancelled".into(),
                    is_error: true,
                })
                .await;
        }
        let _ = tx.send(AgentEvent::TurnComplete(FinishReason::Canceled)).await;
        let _ = tx.send(AgentEvent::Error { kind: ErrorKind::Canceled, message: "request cancelled".into() }).await;
        Ok(())
    }

    fn spawn_title_task(&self, session_id: &str, user_text: &str) {
        let Some(model) = self.title.clone() else { return };
        let store = self.store.clone();
        let session_id = session_id.to_string();
        let prompt = title_prompt(user_text);
        tokio::spawn(async move {
            let req = CompletionRequest {
                messages: vec![Message::user(prompt)],
                tools: vec![],
                stream: true,
                system_dynamic_suffix: None,
                cache_key: None,
            };
            let result: Result<String> = async {
                let mut stream = model.complete(req).await?;
                let mut text = String::new();
                while let Some(event) = stream.next().await {
                    match event? {
                        ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                        ResponseEvent::Done => break,
                        ResponseEvent::Error(msg) => bail!(msg),
                        _ => {}
                    }
                }
                Ok(text)
            }
            .await;
            match result {
                Ok(raw) => {
                    let title = sanitize_title(&raw);
                    if !title.is_empty() {
                        if let Err(e) = store.set_session_title(&session_id, &title).await {
                            warn!(session_id, error = %e, "failed to persist generated title");
                        } else {
                            info!(session_id, title, "session title generated");
                        }
                    }
                }
                Err(e) => warn!(session_id, error = %e, "title generation failed"),
            }
        });
    }
}

enum StepOutcome {
    Done(FinishReason),
    ContinueWithTools,
    Canceled,
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

struct ResolvedToolCall {
    id: String,
    name: String,
    raw_args: String,
    args: serde_json::Value,
    malformed: bool,
}

/// Turn the accumulated per-index tool-call fragments into ordered, parsed
/// calls. A call with an empty name cannot be dispatched (the model never
/// finished declaring it) and is dropped entirely rather than sent on with
/// corrupt history. Unparseable arguments are kept (so the call still gets
/// an assistant message and a paired tool-result) but flagged `malformed`.
fn finalize_tool_calls(pending: HashMap<u32, PendingToolCall>) -> Vec<ResolvedToolCall> {
    let mut ordered: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
    ordered.sort_by_key(|(index, _)| *index);

    let mut out = Vec::with_capacity(ordered.len());
    for (i, (_, ptc)) in ordered.into_iter().enumerate() {
        if ptc.name.is_empty() {
            warn!(tool_call_id = %ptc.id, "dropping tool call with empty name from model");
            continue;
        }
        let id = if ptc.id.is_empty() { format!("call_synthetic_{i}") } else { ptc.id };
        let (args, malformed) = match serde_json::from_str(&ptc.args_buf) {
            Ok(v) => (v, false),
            Err(_) => match repair_json(&ptc.args_buf) {
                Some(v) => (v, false),
                None => (serde_json::Value::Null, true),
            },
        };
        out.push(ResolvedToolCall { id, name: ptc.name, raw_args: ptc.args_buf, args, malformed });
    }
    out
}

/// Best-effort repair for tool-call argument buffers truncated mid-stream:
/// append a closing quote and/or closing braces and try again. Never
/// attempts a real JSON repair beyond this; anything else is malformed.
fn repair_json(buf: &str) -> Option<serde_json::Value> {
    let candidates = [format!("{buf}\""), format!("{buf}}}"), format!("{buf}\"}}"), format!("{buf}\"}}}}")];
    candidates.iter().find_map(|c| serde_json::from_str(c).ok())
}

/// Every `ToolCall` message without a matching `ToolResult` later in
/// history, in declaration order — the calls a mid-turn cancellation left
/// stranded.
fn unmatched_tool_call_ids(messages: &[Message]) -> Vec<String> {
    let mut resolved = std::collections::HashSet::new();
    for m in messages {
        if let MessageContent::ToolResult { tool_call_id, .. } = &m.content {
            resolved.insert(tool_call_id.clone());
        }
    }
    messages
        .iter()
        .filter_map(|m| match &m.content {
            MessageContent::ToolCall { tool_call_id, .. } if !resolved.contains(tool_call_id) => {
                Some(tool_call_id.clone())
            }
            _ => None,
        })
        .collect()
}

fn role_from_str(s: &str) -> Role {
    match s {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

fn record_to_message(record: &MessageRecord) -> Result<Message> {
    let content: MessageContent = serde_json::from_str(&record.content_json)
        .with_context(|| format!("corrupt content_json for message {}", record.id))?;
    Ok(Message { role: role_from_str(&record.role), content })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
