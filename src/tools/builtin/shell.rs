// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shell command action
//!
//! Runs a command through the configured shell and streams its merged
//! stdout/stderr. A `---STDOUT---` or `---STDERR---` divider is emitted
//! whenever the active source changes, and `---EXIT---` with the exit code
//! closes the output. Dropping the stream kills the child process.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::error::{Result, RunGptError};
use crate::tools::{Action, ActionContext, ActionRequest, OutputStream};
use crate::utils::{strip_ansi, Utf8ChunkDecoder};

/// Action for executing shell commands
pub struct ShellAction {
    /// Patterns that are always blocked
    blocked_patterns: HashSet<String>,
}

impl ShellAction {
    /// Create a new shell action with default settings
    pub fn new() -> Self {
        let blocked_patterns = [
            "rm -rf /",
            "rm -rf /*",
            "mkfs",
            ":(){:|:&};:",
            "> /dev/sda",
            "dd if=/dev/zero of=/dev",
            "shutdown",
            "reboot",
            "poweroff",
            "init 0",
            "init 6",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self { blocked_patterns }
    }

    /// Check if a command is blocked
    fn is_blocked(&self, command: &str) -> bool {
        let lower = command.to_lowercase();
        self.blocked_patterns.iter().any(|p| lower.contains(p))
    }

    /// The command comes from the first parameter when given, else the block.
    fn command_for(request: &ActionRequest) -> Option<String> {
        request
            .parameters
            .get_string("command", 0)
            .or_else(|| Some(request.content.clone()))
            .filter(|command| !command.trim().is_empty())
    }
}

impl Default for ShellAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for ShellAction {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run the block's content as a shell script and capture its output"
    }

    fn usage(&self) -> &str {
        "sh;shell()"
    }

    async fn invoke(&self, request: ActionRequest, context: &ActionContext) -> Result<OutputStream> {
        let command = Self::command_for(&request)
            .ok_or_else(|| RunGptError::InvalidInput("no command to run".to_string()))?;

        if self.is_blocked(&command) {
            return Err(RunGptError::ActionExecution(
                "This command has been blocked for safety reasons.".to_string(),
            ));
        }

        tracing::debug!(target: "rungpt.tools.shell", shell = %context.shell, command = %command, "spawning");

        // stdin(null) keeps commands from waiting for input
        let child = Command::new(&context.shell)
            .arg("-c")
            .arg(&command)
            .current_dir(&context.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunGptError::ActionExecution(format!("Failed to spawn command: {}", e)))?;

        Ok(Box::pin(merged_output(child, context.timeout, context.strip_ansi)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSource {
    Stdout,
    Stderr,
}

impl OutputSource {
    fn marker(self) -> &'static str {
        match self {
            OutputSource::Stdout => "---STDOUT---",
            OutputSource::Stderr => "---STDERR---",
        }
    }
}

/// Held-back text beyond which a line without a newline is released anyway
const MAX_HELD_LINE: usize = 8 * 1024;

/// Strips ANSI escapes from whole lines.
///
/// Reads can end in the middle of an escape sequence, so the trailing
/// partial line is held until its newline arrives or the output ends.
#[derive(Debug, Default)]
struct AnsiLineStripper {
    partial: String,
}

impl AnsiLineStripper {
    fn push(&mut self, text: &str) -> String {
        self.partial.push_str(text);
        let cut = match self.partial.rfind('\n') {
            Some(newline) => newline + 1,
            None if self.partial.len() > MAX_HELD_LINE => {
                self.partial.rfind('\x1b').unwrap_or(self.partial.len())
            }
            None => return String::new(),
        };
        let rest = self.partial.split_off(cut);
        strip_ansi(&std::mem::replace(&mut self.partial, rest))
    }

    fn finish(&mut self) -> String {
        strip_ansi(&std::mem::take(&mut self.partial))
    }
}

fn read_source<R>(
    reader: Option<R>,
    source: OutputSource,
    strip: bool,
) -> impl Stream<Item = Result<(OutputSource, String)>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::try_stream! {
        if let Some(mut reader) = reader {
            let mut decoder = Utf8ChunkDecoder::new();
            let mut stripper = strip.then(AnsiLineStripper::default);
            let mut buf = [0u8; 1024];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let mut text = decoder.push(&buf[..n]);
                if let Some(stripper) = stripper.as_mut() {
                    text = stripper.push(&text);
                }
                if !text.is_empty() {
                    yield (source, text);
                }
            }
            let mut rest = decoder.finish();
            if let Some(stripper) = stripper.as_mut() {
                rest = stripper.push(&rest);
                rest.push_str(&stripper.finish());
            }
            if !rest.is_empty() {
                yield (source, rest);
            }
        }
    }
}

fn timed_out(limit: Duration) -> RunGptError {
    RunGptError::ActionExecution(format!("command timed out after {}s", limit.as_secs_f32()))
}

fn merged_output(
    mut child: Child,
    timeout: Option<Duration>,
    strip: bool,
) -> impl Stream<Item = Result<String>> + Send {
    let stdout = read_source(child.stdout.take(), OutputSource::Stdout, strip);
    let stderr = read_source(child.stderr.take(), OutputSource::Stderr, strip);

    async_stream::try_stream! {
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let mut merged = futures::stream::select(Box::pin(stdout), Box::pin(stderr));
        let mut active: Option<OutputSource> = None;

        loop {
            let next = match deadline {
                Some((at, limit)) => tokio::time::timeout_at(at, merged.next())
                    .await
                    .map_err(|_| timed_out(limit))?,
                None => merged.next().await,
            };
            let Some(item) = next else {
                break;
            };
            let (source, text) = item?;
            if active != Some(source) {
                let separator = if active.is_some() { "\n" } else { "" };
                active = Some(source);
                yield format!("{}{}\n", separator, source.marker());
            }
            yield text;
        }

        let status = match deadline {
            Some((at, limit)) => tokio::time::timeout_at(at, child.wait())
                .await
                .map_err(|_| timed_out(limit))??,
            None => child.wait().await?,
        };

        match status.code() {
            Some(code) => {
                yield format!("\n---EXIT---\nExit code {}\n", code);
                if code != 0 {
                    Err::<(), _>(RunGptError::ActionExecution(format!(
                        "command exited with code {}",
                        code
                    )))?;
                }
            }
            None => {
                yield "\n---EXIT---\nTerminated by signal\n".to_string();
                Err::<(), _>(RunGptError::ActionExecution(
                    "command was terminated by a signal".to_string(),
                ))?;
            }
        }
    }
}
