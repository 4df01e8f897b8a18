// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! [`ContentAccumulator`] folds delta records for one in-flight assistant
//! message into its running text. Each call to [`ContentAccumulator::push`]
//! returns the fragment to render live; [`ContentAccumulator::finish`] hands
//! back the complete text once the stream has ended.

use crate::chat::json_field::JsonFieldStreamer;
use crate::llm::delta::DeltaMessage;

/// Accumulator for one streamed message
#[derive(Debug, Default)]
pub struct ContentAccumulator {
    text: String,
    /// Restricts output to one JSON string field when set
    field: Option<JsonFieldStreamer>,
    fragments: usize,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accumulate the decoded value of `field` from a JSON reply.
    pub fn with_json_field(field: impl Into<String>) -> Self {
        Self {
            field: Some(JsonFieldStreamer::new(field)),
            ..Self::default()
        }
    }

    /// Process a delta and return the text to append, if any.
    pub fn push(&mut self, delta: &DeltaMessage) -> Option<String> {
        let raw = delta.fragment()?;
        let fragment = match self.field.as_mut() {
            Some(field) => field.push(raw),
            None => raw.to_string(),
        };
        if fragment.is_empty() {
            return None;
        }
        self.text.push_str(&fragment);
        self.fragments += 1;
        Some(fragment)
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of non-empty fragments appended
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// The complete text, or `None` if nothing was accumulated.
    pub fn finish(self) -> Option<String> {
        if self.text.is_empty() {
            None
        } else {
            Some(self.text)
        }
    }
}
