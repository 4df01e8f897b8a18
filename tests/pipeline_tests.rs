// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tempfile::TempDir;

use rungpt::chat::events::ChatEvent;
use rungpt::chat::prompt::initial_history;
use rungpt::chat::{ChatHistory, ConversationDriver, DriverOptions};
use rungpt::config::ScanMode;
use rungpt::llm::message::{ChatMessage, ChatRole};
use rungpt::llm::mock_provider::MockProvider;
use rungpt::tools::{ActionContext, ActionExecutor, ActionRegistry};

fn driver_in(dir: &TempDir, provider: &MockProvider, scan_mode: ScanMode) -> ConversationDriver {
    let options = DriverOptions {
        resubmit_delay: Duration::ZERO,
        scan_mode,
        ..DriverOptions::default()
    };
    driver_with(dir, provider, options)
}

fn driver_with(dir: &TempDir, provider: &MockProvider, options: DriverOptions) -> ConversationDriver {
    let registry = Arc::new(ActionRegistry::with_builtins());
    let context = ActionContext::new(dir.path().to_path_buf());
    ConversationDriver::new(
        Arc::new(provider.clone()),
        ActionExecutor::new(registry, context),
        options,
    )
}

fn user_history(prompt: &str) -> (ChatHistory, usize) {
    let mut history = initial_history(&ActionRegistry::with_builtins(), None);
    let index = history.add_message(ChatMessage::user(prompt));
    (history, index)
}

fn errors(events: &[ChatEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_block_output_reaches_the_model() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_text_response(["Running it:\n```sh;shell()\n", "echo hi\n```\n"])
        .with_text_response(["It printed hi."]);
    let driver = driver_in(&dir, &provider, ScanMode::OnFlush);
    let (mut history, input) = user_history("say hi");

    let report = driver.submit(&mut history, vec![input]).await.unwrap();

    assert_eq!(report.rounds, 2);
    assert!(!report.stopped_at_limit);

    let output = history.get(3).unwrap();
    assert_eq!(output.role, ChatRole::System);
    assert_eq!(output.content, "---STDOUT---\nhi\n\n---EXIT---\nExit code 0\n");

    let reply = history.get(2).unwrap();
    assert_eq!(reply.actions.len(), 1);
    assert_eq!(reply.actions[0].tool, "shell");
    assert_eq!(reply.actions[0].input, "shell()");
    assert_eq!(reply.actions[0].result.as_deref(), Some(output.content.as_str()));

    let resubmitted = provider.last_request().unwrap();
    assert_eq!(resubmitted.messages.last().unwrap().content, output.content);
    assert_eq!(history.get(4).unwrap().content, "It printed hi.");
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_action_does_not_stop_the_block() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_text_response(["```sh;shell(\"exit 3\");write_file(\"out.txt\")\nsaved\n```"])
        .with_text_response(["ok"]);
    let driver = driver_in(&dir, &provider, ScanMode::OnFlush);
    let (mut history, input) = user_history("go");

    let events: Vec<ChatEvent> = driver.event_stream(&mut history, vec![input]).collect().await;

    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("exited with code 3"));

    assert!(history.get(3).unwrap().content.contains("Exit code 3"));
    assert!(history.get(3).unwrap().finalized);
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "saved");
    assert!(history.get(4).unwrap().content.starts_with("Wrote "));
    assert_eq!(history.get(5).unwrap().content, "ok");
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_text_response(["```txt;write_file(\"notes/a.txt\")\nline one\n```"])
        .with_text_response(["```rungpt:action\nread_file(\"notes/a.txt\")\n```"])
        .with_text_response(["Done."]);
    let driver = driver_in(&dir, &provider, ScanMode::Incremental);
    let (mut history, input) = user_history("store and recall");

    let report = driver.submit(&mut history, vec![input]).await.unwrap();

    assert_eq!(report.rounds, 3);
    let contents: Vec<&str> = history.messages().iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"line one"));
    assert_eq!(std::fs::read_to_string(dir.path().join("notes/a.txt")).unwrap(), "line one");
    assert_eq!(contents.last(), Some(&"Done."));
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_loop_terminates_without_new_messages() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_text_response(["```python\nprint('not an invocation')\n```"]);
    let driver = driver_in(&dir, &provider, ScanMode::OnFlush);
    let (mut history, input) = user_history("show code");

    let report = driver.submit(&mut history, vec![input]).await.unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(report.added_messages, 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_invalid_action_block_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new().with_text_response([
        "```rungpt:action\nwrite_file(\"x.txt\")\nthis is not an invocation\n```",
    ]);
    let driver = driver_in(&dir, &provider, ScanMode::OnFlush);
    let (mut history, input) = user_history("x");

    let events: Vec<ChatEvent> = driver.event_stream(&mut history, vec![input]).collect().await;

    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("line 2"));
    assert!(!dir.path().join("x.txt").exists());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_dropping_event_stream_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new()
        .with_text_response(["```txt;write_file(\"one.txt\")\n1\n```"])
        .with_text_response(["```txt;write_file(\"two.txt\")\n2\n```"]);
    let options = DriverOptions {
        resubmit_delay: Duration::from_secs(60),
        ..DriverOptions::default()
    };
    let driver = driver_with(&dir, &provider, options);
    let (mut history, input) = user_history("x");

    {
        let events = driver.event_stream(&mut history, vec![input]);
        futures::pin_mut!(events);
        // Read until the first finalized reply, then walk away.
        while let Some(event) = events.next().await {
            if matches!(event, ChatEvent::Finalize { role: ChatRole::Assistant, .. }) {
                break;
            }
        }
    }

    assert!(dir.path().join("one.txt").exists());
    assert!(!dir.path().join("two.txt").exists());
    assert_eq!(provider.call_count(), 1);
}
