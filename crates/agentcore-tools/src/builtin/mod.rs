// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod edit_file;
pub mod glob;
pub mod grep;
pub mod list_dir;
pub mod patch;
pub mod read_file;
pub mod read_lints;
pub mod run_terminal_command;
pub mod web_fetch;
pub mod write_file;
