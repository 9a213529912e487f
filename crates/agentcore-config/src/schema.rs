// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ModelConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub permission: PermissionConfig,
    /// Named provider configurations, selectable with `--model <key>`.
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier. Currently "openai" (OpenAI-compatible chunked-JSON
    /// wire format) or "mock" (deterministic in-memory driver for tests).
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override. Required for self-hosted / local inference servers.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
    /// Context window size in tokens, used by the budget gate to decide when
    /// to compact. Overridable per-provider since local models vary widely.
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    /// Path to YAML mock-responses file (used when provider = "mock").
    pub mock_responses_file: Option<String>,
}

fn default_context_window() -> u32 {
    128_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            context_window: default_context_window(),
            mock_responses_file: None,
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    200
}
fn default_compaction_threshold() -> f32 {
    0.85
}

/// Strategy used when compacting the session context.
///
/// `Structured` (default) instructs the model to produce a typed Markdown
/// checkpoint with fixed sections (Active Task, Key Decisions, Files &
/// Artifacts, Constraints, Pending Items, Session Narrative). `Narrative`
/// uses a free-form summarisation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStrategy {
    #[default]
    Structured,
    Narrative,
}

impl std::fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::Structured => write!(f, "structured"),
            CompactionStrategy::Narrative => write!(f, "narrative"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of autonomous tool-call rounds before stopping with
    /// finish-reason `error` (taxonomy kind `loop_limit`).
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Token fraction at which proactive compaction triggers (0.0–1.0).
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f32,
    /// Number of recent non-system messages preserved verbatim during
    /// compaction. Set to 0 to summarise the full history.
    #[serde(default = "default_compaction_keep_recent")]
    pub compaction_keep_recent: usize,
    #[serde(default)]
    pub compaction_strategy: CompactionStrategy,
    /// Maximum tokens allowed for a single tool result before it is
    /// deterministically truncated before entering the session.
    #[serde(default = "default_tool_result_token_cap")]
    pub tool_result_token_cap: usize,
    /// Fraction of the context window reserved for tool schemas and
    /// measurement error in the token approximation.
    #[serde(default = "default_compaction_overhead_reserve")]
    pub compaction_overhead_reserve: f32,
    /// System prompt override; leave None to use the built-in prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Per-step wall-clock timeout in seconds (0 = no limit).
    #[serde(default)]
    pub max_step_timeout_secs: u64,
    /// Total run wall-clock timeout in seconds (0 = no limit).
    #[serde(default)]
    pub max_run_timeout_secs: u64,
}

fn default_compaction_keep_recent() -> usize {
    6
}
fn default_tool_result_token_cap() -> usize {
    4000
}
fn default_compaction_overhead_reserve() -> f32 {
    0.10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            compaction_threshold: default_compaction_threshold(),
            compaction_keep_recent: default_compaction_keep_recent(),
            compaction_strategy: CompactionStrategy::Structured,
            tool_result_token_cap: default_tool_result_token_cap(),
            compaction_overhead_reserve: default_compaction_overhead_reserve(),
            system_prompt: None,
            max_step_timeout_secs: 0,
            max_run_timeout_secs: 0,
        }
    }
}

/// The three agent roles sharing one process: the user-facing primary
/// agent, the reduced-capability delegated sub-agent, and the title
/// side-task. Each gets its own `AgentConfig` so e.g. the title task can
/// use a cheaper model/lower round cap without touching the primary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub primary: AgentConfig,
    #[serde(default)]
    pub delegated: AgentConfig,
    #[serde(default = "default_title_agent_config")]
    pub title: AgentConfig,
}

fn default_title_agent_config() -> AgentConfig {
    AgentConfig {
        max_tool_rounds: 1,
        ..AgentConfig::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file holding sessions/messages/files.
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    "~/.local/share/agentcore/state.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Automatically approve shell commands / paths matching these glob
    /// patterns without consulting the permission gate.
    pub auto_approve_patterns: Vec<String>,
    /// Always deny commands / paths matching these glob patterns, even if
    /// an auto_approve_pattern would otherwise match.
    pub deny_patterns: Vec<String>,
    /// Timeout in seconds for a single tool call
    pub timeout_secs: u64,
    /// Web fetch configuration
    #[serde(default)]
    pub web: WebConfig,
    /// Linter configuration consulted by the diagnostics tool
    #[serde(default)]
    pub lints: LintsConfig,
    /// Optional external tool RPC endpoint. Accepted for forward
    /// compatibility; dialing out to it is not implemented.
    #[serde(default)]
    pub external_rpc_url: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve_patterns: vec!["cat *".into(), "ls *".into(), "rg *".into()],
            deny_patterns: vec!["rm -rf /*".into(), "dd if=*".into()],
            timeout_secs: 30,
            web: WebConfig::default(),
            lints: LintsConfig::default(),
            external_rpc_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Default maximum characters for web_fetch responses
    pub fetch_max_chars: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            fetch_max_chars: 50_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintsConfig {
    /// Override the lint command for Rust projects
    pub rust_command: Option<String>,
    /// Override the lint command for TypeScript/JS projects
    pub typescript_command: Option<String>,
    /// Override the lint command for Python projects
    pub python_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Tool-call round-trip timeout while waiting on a human decision, in
    /// seconds. Exceeding it resolves the request as denied.
    #[serde(default = "default_permission_timeout_secs")]
    pub decision_timeout_secs: u64,
}

fn default_permission_timeout_secs() -> u64 {
    300
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            decision_timeout_secs: default_permission_timeout_secs(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_model_provider_is_openai() {
        let c = Config::default();
        assert_eq!(c.provider.provider, "openai");
    }

    #[test]
    fn config_default_model_name_is_gpt4o() {
        let c = Config::default();
        assert_eq!(c.provider.name, "gpt-4o");
    }

    #[test]
    fn config_default_no_explicit_api_key() {
        let c = Config::default();
        assert!(c.provider.api_key.is_none());
    }

    #[test]
    fn config_default_max_tool_rounds_positive() {
        let c = Config::default();
        assert!(c.agents.primary.max_tool_rounds > 0);
    }

    #[test]
    fn config_title_agent_has_reduced_tool_rounds() {
        let c = Config::default();
        assert_eq!(c.agents.title.max_tool_rounds, 1);
    }

    #[test]
    fn config_default_compaction_threshold_in_range() {
        let c = Config::default();
        assert!(c.agents.primary.compaction_threshold > 0.0);
        assert!(c.agents.primary.compaction_threshold < 1.0);
    }

    #[test]
    fn config_default_compaction_keep_recent_is_six() {
        let c = Config::default();
        assert_eq!(c.agents.primary.compaction_keep_recent, 6);
    }

    #[test]
    fn config_compaction_keep_recent_yaml_round_trip() {
        let yaml_str = "agents:\n  primary:\n    compaction_keep_recent: 10\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.agents.primary.compaction_keep_recent, 10);
        let back_yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&back_yaml).unwrap();
        assert_eq!(back.agents.primary.compaction_keep_recent, 10);
    }

    #[test]
    fn config_compaction_keep_recent_defaults_when_absent_from_yaml() {
        let yaml_str = "agents:\n  primary:\n    max_tool_rounds: 30\n    compaction_threshold: 0.9\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(
            c.agents.primary.compaction_keep_recent, 6,
            "serde default must fill in missing field"
        );
    }

    #[test]
    fn config_default_no_system_prompt_override() {
        let c = Config::default();
        assert!(c.agents.primary.system_prompt.is_none());
    }

    #[test]
    fn config_default_tools_has_auto_approve_patterns() {
        let c = Config::default();
        assert!(!c.tools.auto_approve_patterns.is_empty());
    }

    #[test]
    fn config_default_database_path_is_nonempty() {
        let c = Config::default();
        assert!(!c.database.path.is_empty());
    }

    #[test]
    fn config_default_permission_timeout_is_five_minutes() {
        let c = Config::default();
        assert_eq!(c.permission.decision_timeout_secs, 300);
    }

    #[test]
    fn config_serialises_to_valid_yaml() {
        let c = Config::default();
        let yaml_str = serde_yaml::to_string(&c).unwrap();
        assert!(yaml_str.contains("provider"));
        assert!(yaml_str.contains("openai"));
    }

    #[test]
    fn config_deserialises_from_yaml() {
        let yaml_str = "provider:\n  provider: openai\n  name: llama3.2\n  max_tokens: 8192\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.provider.provider, "openai");
        assert_eq!(c.provider.name, "llama3.2");
        assert_eq!(c.provider.max_tokens, Some(8192));
    }

    #[test]
    fn config_partial_yaml_fills_in_defaults() {
        let yaml_str = "provider:\n  name: gpt-4o-mini\n  provider: openai\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.provider.name, "gpt-4o-mini");
        assert_eq!(
            c.agents.primary.max_tool_rounds,
            AgentConfig::default().max_tool_rounds
        );
    }

    #[test]
    fn config_default_providers_is_empty() {
        let c = Config::default();
        assert!(c.providers.is_empty(), "providers must be empty by default");
    }

    #[test]
    fn config_providers_deserialised_from_yaml() {
        let yaml = r#"
providers:
  local:
    provider: openai
    base_url: http://localhost:11434/v1
    name: llama3.2
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.providers.len(), 1);
        let p = c.providers.get("local").unwrap();
        assert_eq!(p.provider, "openai");
        assert_eq!(p.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(p.name, "llama3.2");
    }

    #[test]
    fn config_providers_round_trip_yaml() {
        let yaml = r#"
providers:
  local:
    provider: openai
    base_url: http://127.0.0.1:8080/v1
    name: phi-3
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        let serialised = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&serialised).unwrap();
        let p = back.providers.get("local").unwrap();
        assert_eq!(p.name, "phi-3");
        assert_eq!(p.base_url.as_deref(), Some("http://127.0.0.1:8080/v1"));
    }

    #[test]
    fn config_providers_absent_in_yaml_uses_empty_default() {
        let yaml = "provider:\n  provider: openai\n  name: gpt-4o\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(c.providers.is_empty());
    }
}
