// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File write action
//!
//! Writes the content of the invoking block to a file, creating parent
//! directories as needed. Existing files are replaced.

use async_trait::async_trait;

use crate::error::{Result, RunGptError};
use crate::tools::{output_from, Action, ActionContext, ActionRequest, OutputStream};
use crate::utils::format_size;

/// Action for writing files
pub struct FileWriteAction;

#[async_trait]
impl Action for FileWriteAction {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write the block's content to a file"
    }

    fn usage(&self) -> &str {
        "typescript;write_file(\"path/to/file.ts\")"
    }

    async fn invoke(&self, request: ActionRequest, context: &ActionContext) -> Result<OutputStream> {
        let path_str = request
            .parameters
            .get_string("path", 0)
            .ok_or_else(|| RunGptError::InvalidInput("path is required".to_string()))?;
        let path = context.resolve_path(&path_str);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RunGptError::ActionExecution(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = request.content;
        tokio::fs::write(&path, &content).await.map_err(|e| {
            RunGptError::ActionExecution(format!("Failed to write {}: {}", path.display(), e))
        })?;

        tracing::debug!(target: "rungpt.tools.write_file", path = %path.display(), bytes = content.len(), "wrote file");

        Ok(output_from([Ok(format!(
            "Wrote {} to {}\n",
            format_size(content.len() as u64),
            path_str
        ))]))
    }
}
