// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Prompt/response transcripts
//!
//! Each logger owns one session directory (named after its start time);
//! every model call gets its own file inside it. Writes happen on the
//! round's task, so they go through `tokio::fs`.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::llm::provider::CompletionRequest;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3fZ";

/// Writes one directory of transcripts per session
#[derive(Debug, Clone)]
pub struct PromptLog {
    session_dir: PathBuf,
}

impl PromptLog {
    /// Create the session directory under `root`. Runs once at startup,
    /// before any round.
    pub fn new(root: &Path) -> Result<Self> {
        let session_dir = root.join(Utc::now().format(TIMESTAMP_FORMAT).to_string());
        std::fs::create_dir_all(&session_dir)?;
        Ok(Self { session_dir })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Start the transcript of one call.
    pub async fn log_prompt(&self, model: &str, prompt: &str) -> Result<PromptLogEntry> {
        let stamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let header = format!("---PROMPT ({})---\n{}\n", model, prompt);
        // Two calls within the same millisecond must not share a file.
        let mut suffix = 0;
        loop {
            let name = match suffix {
                0 => format!("{}.log", stamp),
                n => format!("{}-{}.log", stamp, n),
            };
            let path = self.session_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(header.as_bytes()).await?;
                    file.flush().await?;
                    return Ok(PromptLogEntry {
                        path,
                        started: Instant::now(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start the transcript of a completion request.
    pub async fn log_request(&self, request: &CompletionRequest) -> Result<PromptLogEntry> {
        let prompt = request
            .messages
            .iter()
            .map(|m| format!("[{}] {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        self.log_prompt(&request.model, &prompt).await
    }
}

/// Transcript file of a single model call
#[derive(Debug)]
pub struct PromptLogEntry {
    path: PathBuf,
    started: Instant,
}

impl PromptLogEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn log_response(&self, response: &str) -> Result<()> {
        self.append(&format!("---RESPONSE ({})---\n{}\n", self.elapsed(), response))
            .await
    }

    pub async fn log_error(&self, message: &str) -> Result<()> {
        self.append(&format!("---ERROR ({})---\n{}\n", self.elapsed(), message))
            .await
    }

    fn elapsed(&self) -> String {
        format!("{:.1}s", self.started.elapsed().as_secs_f64())
    }

    async fn append(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
