// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sub-agent delegation. `TaskTool` runs a focused, read-only `Agent`
//! against a child session and returns its final text. Depth is capped at
//! one level — a delegated agent never has a `task` tool of its own, so
//! nesting is structurally impossible rather than counter-checked at
//! runtime.

use std::sync::Arc;

use agentcore_config::AgentConfig;
use agentcore_model::ModelProvider;
use agentcore_permission::PermissionGate;
use agentcore_store::Store;
use agentcore_tools::{
    policy::ApprovalPolicy, GlobTool, GrepTool, ListDirTool, ReadLintsTool, Tool, ToolCall,
    ToolOutput, ToolPolicy, ToolRegistry,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::Agent;
use crate::events::AgentEvent;

pub struct TaskTool {
    store: Store,
    gate: Arc<PermissionGate>,
    policy: Arc<ToolPolicy>,
    model: Arc<dyn ModelProvider>,
    config: AgentConfig,
}

impl TaskTool {
    pub fn new(
        store: Store,
        gate: Arc<PermissionGate>,
        policy: Arc<ToolPolicy>,
        model: Arc<dyn ModelProvider>,
        config: AgentConfig,
    ) -> Self {
        Self { store, gate, policy, model, config }
    }

    /// A sub-agent can look but not touch: no `write`, `edit_file`, `patch`,
    /// `shell`, `web_fetch`, or `task` itself.
    fn build_sub_registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(agentcore_tools::ReadFileTool);
        reg.register(ListDirTool);
        reg.register(GlobTool);
        reg.register(GrepTool);
        reg.register(ReadLintsTool);
        reg
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Delegate a well-scoped, read-only investigation to a sub-agent and return its final \
         text answer. The sub-agent can read and search the codebase but cannot edit files, run \
         shell commands, or delegate further. Use it to explore an open-ended question in \
         parallel with the main task rather than doing the exploration inline."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task description for the sub-agent"
                }
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(prompt) = call.args.get("prompt").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'prompt'");
        };

        let child = match self.store.create_session(None).await {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("failed to create sub-agent session: {e}")),
        };
        debug!(session_id = %child.id, "task: spawning sub-agent");

        let tools = Arc::new(Self::build_sub_registry());
        let agent = Agent::new(
            self.store.clone(),
            self.gate.clone(),
            tools,
            self.policy.clone(),
            self.model.clone(),
            self.config.clone(),
        );

        let mut stream = match agent.run(&child.id, prompt).await {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("sub-agent failed to start: {e}")),
        };

        let mut output = String::new();
        let mut failed: Option<String> = None;
        use futures::StreamExt;
        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::TextDelta(delta) => output.push_str(&delta),
                AgentEvent::Error { message, .. } => failed = Some(message),
                _ => {}
            }
        }

        if output.is_empty() {
            if let Some(message) = failed {
                return ToolOutput::err(&call.id, format!("sub-agent error: {message}"));
            }
            return ToolOutput::ok(&call.id, "(sub-agent produced no text output)");
        }
        ToolOutput::ok(&call.id, output)
    }
}
