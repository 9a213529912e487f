// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string occurrence in a file. old_string must appear exactly once in \
         the file — read the file first to copy the surrounding context verbatim (including \
         whitespace). If old_string is not unique, include more of the surrounding lines until \
         it is. Fails without modifying the file if old_string occurs zero or more than once. \
         For changes spanning multiple, non-contiguous locations prefer the patch tool instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace. Must match exactly once in the file."
                },
                "new_string": {
                    "type": "string",
                    "description": "Text to replace old_string with"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn requires_permission(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter: path"),
        };
        let old_string = match call.args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter: old_string"),
        };
        let new_string = match call.args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter: new_string"),
        };

        debug!(path = %path, "edit_file tool");

        if old_string == new_string {
            return ToolOutput::err(&call.id, "old_string and new_string are identical");
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = content.matches(&old_string).count();
        if occurrences == 0 {
            return ToolOutput::err(
                &call.id,
                "old_string not found in file — re-read the file and copy the exact text, \
                 including whitespace",
            );
        }
        if occurrences > 1 {
            return ToolOutput::err(
                &call.id,
                format!(
                    "old_string is not unique: found {occurrences} occurrences. Include more \
                     surrounding context so it matches exactly once."
                ),
            );
        }

        let updated = content.replacen(&old_string, &new_string, 1);
        match tokio::fs::write(&path, &updated).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("edited {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "e1".into(),
            name: "edit_file".into(),
            args,
        }
    }

    fn tmp_path() -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        format!("/tmp/agentcore_edit_test_{}_{n}.txt", std::process::id())
    }

    #[tokio::test]
    async fn replaces_unique_occurrence() {
        let path = tmp_path();
        std::fs::write(&path, "fn main() {\n    old_call();\n}\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path,
                "old_string": "old_call();",
                "new_string": "new_call();"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let updated = std::fs::read_to_string(&path).unwrap();
        assert!(updated.contains("new_call();"));
        assert!(!updated.contains("old_call();"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn errors_when_old_string_not_found() {
        let path = tmp_path();
        std::fs::write(&path, "hello world\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path,
                "old_string": "missing",
                "new_string": "replacement"
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not found"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn errors_when_old_string_not_unique() {
        let path = tmp_path();
        std::fs::write(&path, "dup\ndup\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path,
                "old_string": "dup",
                "new_string": "once"
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not unique"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn errors_when_old_and_new_are_identical() {
        let path = tmp_path();
        std::fs::write(&path, "same\n").unwrap();
        let out = EditFileTool
            .execute(&call(json!({
                "path": path,
                "old_string": "same",
                "new_string": "same"
            })))
            .await;
        assert!(out.is_error);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_path_is_error() {
        let out = EditFileTool
            .execute(&call(json!({"old_string": "a", "new_string": "b"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("path"));
    }

    #[test]
    fn requires_permission_is_true() {
        assert!(EditFileTool.requires_permission());
    }
}
