// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat-completion delta decoding
//!
//! Turns data payloads into [`DeltaMessage`] records. The `[DONE]` sentinel
//! ends the stream; anything else must be JSON.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Payload that marks the end of a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One parsed streaming chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<DeltaChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DeltaMessage {
    /// Build a single-choice delta carrying `content`.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![DeltaChoice {
                delta: Delta {
                    content: Some(content.into()),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// The first choice's content fragment, if non-empty.
    pub fn fragment(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// Parse one payload. `Ok(None)` means the sentinel was seen.
pub fn parse_payload(payload: &str) -> Result<Option<DeltaMessage>> {
    if payload.trim() == DONE_SENTINEL {
        return Ok(None);
    }
    serde_json::from_str(payload).map(Some).map_err(|e| {
        ApiError::MalformedPayload {
            payload: payload.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Adapt a payload stream into a delta stream.
///
/// The stream ends at the sentinel without polling upstream again, and ends
/// after yielding the first error.
pub fn decode_deltas<S>(payloads: S) -> impl Stream<Item = Result<DeltaMessage>>
where
    S: Stream<Item = Result<String>>,
{
    async_stream::try_stream! {
        futures::pin_mut!(payloads);
        while let Some(payload) = payloads.next().await {
            match parse_payload(&payload?)? {
                Some(delta) => yield delta,
                None => {
                    tracing::debug!(target: "rungpt.llm.delta", "end-of-stream sentinel");
                    break;
                }
            }
        }
    }
}
