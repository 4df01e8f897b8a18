// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! rungpt - let a chat model run actions from fenced code blocks
//!
//! Entry point for the rungpt CLI application.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;

use rungpt::chat::events::ChatEvent;
use rungpt::chat::fence::{scan_document, FenceScanner};
use rungpt::chat::invocation::{decode_action_block, decode_tagged_block, ACTION_BLOCK_TAG};
use rungpt::chat::prompt::initial_history;
use rungpt::chat::transcript::PromptLog;
use rungpt::chat::{ConversationDriver, DriverOptions};
use rungpt::cli::{ChatArgs, Cli, Commands, ConfigArgs, ScanArgs};
use rungpt::config::{ScanMode, Settings};
use rungpt::error::{Result, RunGptError};
use rungpt::llm::message::{ChatMessage, ChatRole};
use rungpt::llm::providers::OpenAiProvider;
use rungpt::tools::{ActionContext, ActionExecutor, ActionRegistry};
use rungpt::utils;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the crate's own diagnostics; `RUST_LOG` still applies.
    let directive = match cli.verbose {
        0 => None,
        1 => Some("rungpt=debug"),
        _ => Some("rungpt=trace"),
    };
    if let Some(directive) = directive {
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    if let Err(error) = run(cli).await {
        eprintln!("{}", utils::format_error(&error));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Chat(args) => run_chat(args, settings, cli.directory).await,
        Commands::Scan(args) => run_scan(args),
        Commands::Actions => run_actions(&settings),
        Commands::Config(args) => run_config(args, &settings, cli.config.as_deref()),
    }
}

/// Send one prompt and print the conversation as it unfolds
async fn run_chat(args: ChatArgs, mut settings: Settings, directory: Option<PathBuf>) -> Result<()> {
    if let Some(model) = args.model {
        settings.provider.model = model;
    }
    if let Some(max_rounds) = args.max_rounds {
        settings.driver.max_rounds = (max_rounds > 0).then_some(max_rounds);
    }
    if args.incremental {
        settings.driver.scan_mode = ScanMode::Incremental;
    }
    if let Some(directory) = directory {
        settings.actions.working_directory = Some(directory);
    }
    settings.validate()?;

    let api_key = settings.api_key().ok_or_else(|| {
        RunGptError::Config(format!(
            "no API key: set {} or provider.api_key",
            settings.provider.api_key_env
        ))
    })?;
    let provider = Arc::new(OpenAiProvider::with_base_url(
        api_key,
        settings.provider.base_url.clone(),
    ));

    let registry = Arc::new(ActionRegistry::with_enabled(&settings.actions.enabled)?);
    let context = ActionContext::from_settings(&settings.actions)?;
    tracing::debug!(
        target: "rungpt.cli",
        working_directory = %context.working_directory.display(),
        actions = ?registry.names(),
        "starting chat"
    );
    let executor = ActionExecutor::new(Arc::clone(&registry), context);

    let mut driver = ConversationDriver::new(provider, executor, DriverOptions::from_settings(&settings));
    if let Some(dir) = settings.transcript_root() {
        driver = driver.with_transcript(PromptLog::new(&dir)?);
    }

    let mut history = initial_history(&registry, settings.conversation.system_prompt.as_deref());
    let input = history.add_message(ChatMessage::user(args.prompt));

    let events = driver.event_stream(&mut history, vec![input]);
    futures::pin_mut!(events);
    let mut stdout = io::stdout();

    loop {
        let event = tokio::select! {
            event = events.next() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "rungpt.cli", "interrupted");
                None
            }
        };
        let Some(event) = event else { break };

        if args.sse {
            write!(stdout, "{}", event.to_sse()?)?;
        } else {
            render_event(&mut stdout, &event)?;
        }
        stdout.flush()?;
    }

    Ok(())
}

/// Plain-text rendering: replies and action output go to stdout, errors to stderr.
fn render_event(out: &mut impl Write, event: &ChatEvent) -> Result<()> {
    match event {
        ChatEvent::Append { append, role, .. } => match role {
            ChatRole::User => {}
            _ => write!(out, "{}", append)?,
        },
        ChatEvent::Finalize { role, .. } => {
            if *role != ChatRole::User {
                writeln!(out)?;
            }
        }
        ChatEvent::Error { message } => eprintln!("error: {}", message),
    }
    Ok(())
}

/// Print the invocation blocks of a file as JSON
fn run_scan(args: ScanArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)?;
    let blocks = if args.incremental {
        FenceScanner::new().finish(&text)
    } else {
        scan_document(&text)?
    };

    let mut found = Vec::new();
    for block in blocks {
        if block.tag == ACTION_BLOCK_TAG {
            let clauses = decode_action_block(&block)?;
            found.push(serde_json::json!({ "block": block, "actions": clauses }));
        } else if let Some(tagged) = decode_tagged_block(block)? {
            found.push(serde_json::to_value(&tagged)?);
        }
    }

    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}

fn run_actions(settings: &Settings) -> Result<()> {
    let registry = ActionRegistry::with_enabled(&settings.actions.enabled)?;
    for name in registry.names() {
        if let Some(action) = registry.get(name) {
            println!("{:<12} {}", action.name(), action.description());
            println!("{:<12} e.g. {}", "", action.usage());
        }
    }
    Ok(())
}

fn run_config(args: ConfigArgs, settings: &Settings, path: Option<&Path>) -> Result<()> {
    if args.init {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Settings::default_path);
        settings.save_to(&path)?;
        println!("Wrote settings to {}", path.display());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
