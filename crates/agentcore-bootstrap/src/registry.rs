// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! The single place where the built-in tool catalogue is assembled, so
//! adding a tool means registering it here once rather than in every
//! frontend that constructs an agent.

use std::sync::Arc;

use agentcore_config::Config;
use agentcore_model::ModelProvider;
use agentcore_permission::PermissionGate;
use agentcore_store::Store;
use agentcore_tools::{
    EditFileTool, GlobTool, GrepTool, ListDirTool, PatchTool, ReadFileTool, ReadLintsTool,
    RunTerminalCommandTool, ToolRegistry, WebFetchTool, WriteTool,
};

use agentcore_core::TaskTool;

/// Build the primary [`ToolRegistry`]: the full read/write/shell/web catalogue
/// plus the sub-agent delegation tool.
pub fn build_tool_registry(
    cfg: &Config,
    store: Store,
    gate: Arc<PermissionGate>,
    model: Arc<dyn ModelProvider>,
) -> ToolRegistry {
    let mut reg = ToolRegistry::new();

    reg.register(ReadFileTool);
    reg.register(ListDirTool);
    reg.register(GlobTool);
    reg.register(GrepTool);
    reg.register(ReadLintsTool);
    reg.register(WriteTool);
    reg.register(EditFileTool);
    reg.register(PatchTool);
    reg.register(RunTerminalCommandTool {
        timeout_secs: cfg.tools.timeout_secs,
    });
    reg.register(WebFetchTool);

    let policy = Arc::new(agentcore_tools::ToolPolicy::from_config(&cfg.tools));
    reg.register(TaskTool::new(store, gate, policy, model, cfg.agents.delegated.clone()));

    reg
}
