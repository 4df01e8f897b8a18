// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for rungpt.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rungpt - let a chat model run actions from fenced code blocks
#[derive(Parser, Debug)]
#[command(name = "rungpt")]
#[command(version, about = "Let a chat model run actions from fenced code blocks")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Working directory for actions (defaults to current)
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt and stream the conversation until it settles
    Chat(ChatArgs),

    /// Print the invocation blocks found in a file as JSON
    Scan(ScanArgs),

    /// List the enabled actions
    Actions,

    /// Print the effective settings, or write them with --init
    Config(ConfigArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// The prompt to send
    pub prompt: String,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum model submissions (0 = unlimited)
    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Run blocks as soon as they close instead of after the reply ends
    #[arg(long)]
    pub incremental: bool,

    /// Print SSE-encoded events instead of plain text
    #[arg(long)]
    pub sse: bool,
}

/// Arguments for the scan subcommand
#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// File to scan
    pub file: PathBuf,

    /// Tolerate a trailing unclosed block
    #[arg(long)]
    pub incremental: bool,
}

/// Arguments for the config subcommand
#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Write the effective settings to the settings file
    #[arg(long)]
    pub init: bool,
}
