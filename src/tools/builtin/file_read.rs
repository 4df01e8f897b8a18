// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File read action
//!
//! Streams a file's contents in chunks.

use async_trait::async_trait;
use futures::Stream;
use tokio::io::AsyncReadExt;

use crate::error::{Result, RunGptError};
use crate::tools::{Action, ActionContext, ActionRequest, OutputStream};
use crate::utils::Utf8ChunkDecoder;

const READ_CHUNK: usize = 8 * 1024;

/// Action for reading files
pub struct FileReadAction;

#[async_trait]
impl Action for FileReadAction {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and add its contents to the conversation"
    }

    fn usage(&self) -> &str {
        "read_file(\"path/to/file\")"
    }

    async fn invoke(&self, request: ActionRequest, context: &ActionContext) -> Result<OutputStream> {
        let path_str = request
            .parameters
            .get_string("path", 0)
            .ok_or_else(|| RunGptError::InvalidInput("path is required".to_string()))?;
        let path = context.resolve_path(&path_str);

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            RunGptError::ActionExecution(format!("Failed to open {}: {}", path.display(), e))
        })?;

        Ok(Box::pin(read_chunks(file)))
    }
}

fn read_chunks(mut file: tokio::fs::File) -> impl Stream<Item = Result<String>> + Send {
    async_stream::try_stream! {
        let mut decoder = Utf8ChunkDecoder::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let text = decoder.push(&buf[..n]);
            if !text.is_empty() {
                yield text;
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            yield rest;
        }
    }
}
