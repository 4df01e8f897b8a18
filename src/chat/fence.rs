// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Fenced code block scanning
//!
//! A fence is a line starting with three backticks. The rest of the opening
//! line (trimmed) is the block's tag; the lines up to the next fence line
//! are its content.
//!
//! [`scan_document`] treats its input as final and rejects an unclosed
//! fence. [`FenceScanner`] is fed a growing prefix of one document and
//! remembers how far it got, so each closed block is emitted exactly once.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Marker that opens and closes a fenced block.
pub const FENCE_MARKER: &str = "```";

/// A closed fenced block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCodeBlock {
    pub tag: String,
    pub content: String,
}

impl ParsedCodeBlock {
    pub fn new(tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            content: content.into(),
        }
    }
}

fn fence_tag(line: &str) -> Option<&str> {
    line.trim_end_matches('\r')
        .strip_prefix(FENCE_MARKER)
        .map(str::trim)
}

fn closing_fence(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| fence_tag(lines[i]).is_some())
}

/// A content line without the `\r` of a CRLF line ending.
fn content_line(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn block_at(lines: &[&str], open: usize, close: usize, tag: &str) -> ParsedCodeBlock {
    let content: Vec<&str> = lines[open + 1..close].iter().map(|line| content_line(line)).collect();
    ParsedCodeBlock::new(tag, content.join("\n"))
}

/// Scan a complete document.
///
/// Fails on the first fence that is never closed.
pub fn scan_document(text: &str) -> Result<Vec<ParsedCodeBlock>, ScanError> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut blocks = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let Some(tag) = fence_tag(lines[index]) else {
            index += 1;
            continue;
        };
        let Some(close) = closing_fence(&lines, index + 1) else {
            return Err(ScanError::UnterminatedBlock {
                tag: tag.to_string(),
                line: index + 1,
            });
        };
        blocks.push(block_at(&lines, index, close, tag));
        index = close + 1;
    }

    Ok(blocks)
}

#[derive(Debug, Clone)]
struct OpenFence {
    tag: String,
    line: usize,
    content: Vec<String>,
}

/// Incremental scanner for one growing document.
///
/// Each line is examined once: the scanner keeps the byte offset of the
/// first unexamined line and the lines of a block that is still open.
#[derive(Debug, Default, Clone)]
pub struct FenceScanner {
    offset: usize,
    next_line: usize,
    open: Option<OpenFence>,
    emitted: usize,
}

impl FenceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the newly completed lines of `text`.
    ///
    /// Only newline-terminated lines are considered, since the last line may
    /// still be growing. An unclosed fence is carried over to the next call.
    pub fn scan(&mut self, text: &str) -> Vec<ParsedCodeBlock> {
        match text.rfind('\n') {
            Some(end) => self.scan_until(text, end),
            None => Vec::new(),
        }
    }

    /// Scan the final text, including an unterminated last line.
    ///
    /// A fence still open at the end is dropped silently.
    pub fn finish(&mut self, text: &str) -> Vec<ParsedCodeBlock> {
        let blocks = self.scan_until(text, text.len());
        if let Some(open) = self.open.take() {
            tracing::debug!(target: "rungpt.chat.fence", line = open.line, tag = %open.tag, "dropping unclosed block");
        }
        blocks
    }

    /// Lines examined so far
    pub fn next_line(&self) -> usize {
        self.next_line
    }

    /// Blocks emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Start over for a new document.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn scan_until(&mut self, text: &str, end: usize) -> Vec<ParsedCodeBlock> {
        let mut blocks = Vec::new();
        if self.offset > end {
            return blocks;
        }

        for line in text[self.offset..end].split('\n') {
            self.offset += line.len() + 1;
            self.next_line += 1;

            match (self.open.take(), fence_tag(line)) {
                (None, None) => {}
                (None, Some(tag)) => {
                    self.open = Some(OpenFence {
                        tag: tag.to_string(),
                        line: self.next_line,
                        content: Vec::new(),
                    });
                }
                (Some(open), Some(_)) => {
                    blocks.push(ParsedCodeBlock::new(open.tag, open.content.join("\n")));
                }
                (Some(mut open), None) => {
                    open.content.push(content_line(line).to_string());
                    self.open = Some(open);
                }
            }
        }

        if let Some(open) = &self.open {
            tracing::trace!(
                target: "rungpt.chat.fence",
                line = open.line,
                tag = %open.tag,
                "waiting for closing fence"
            );
        }
        self.emitted += blocks.len();
        blocks
    }
}
