// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "agentcore",
    about = "Agent inference core for a terminal-based AI coding assistant",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override the SQLite database path from config.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Override the configured provider's base URL.
    #[arg(long, global = true)]
    pub provider_base_url: Option<String>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single prompt to completion and print the assistant's reply.
    Run {
        /// The prompt to send to the agent.
        prompt: String,
        /// Resume an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
        /// Model override, e.g. "gpt-4o" or "anthropic/claude-opus-4-5"
        #[arg(long, short = 'M', env = "AGENTCORE_MODEL")]
        model: Option<String>,
    },
    /// Print the effective configuration and exit.
    ShowConfig,
    /// List saved sessions.
    Sessions {
        /// Maximum number of sessions to show.
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },
}
