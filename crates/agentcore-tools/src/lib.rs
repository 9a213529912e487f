// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod policy;
pub mod registry;
pub mod tool;

pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub use builtin::edit_file::EditFileTool;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::list_dir::ListDirTool;
pub use builtin::patch::PatchTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::read_lints::ReadLintsTool;
pub use builtin::run_terminal_command::RunTerminalCommandTool;
pub use builtin::web_fetch::WebFetchTool;
pub use builtin::write_file::WriteTool;
