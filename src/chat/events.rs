// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Outbound conversation events
//!
//! Clients only ever see these three shapes, each sent as one SSE `data:`
//! line of JSON.

use serde::Serialize;

use crate::error::Result;
use crate::llm::message::{ActionRecord, ChatRole};
use crate::llm::sse::encode_data;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    /// Text was added to a message
    Append {
        index: usize,
        append: String,
        role: ChatRole,
    },
    /// A message is complete
    Finalize {
        index: usize,
        text: String,
        actions: Vec<ActionRecord>,
        role: ChatRole,
    },
    /// A recovered or fatal failure, message only
    Error { message: String },
}

impl ChatEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ChatEvent::Error {
            message: message.into(),
        }
    }

    /// Index of the message this event concerns
    pub fn index(&self) -> Option<usize> {
        match self {
            ChatEvent::Append { index, .. } | ChatEvent::Finalize { index, .. } => Some(*index),
            ChatEvent::Error { .. } => None,
        }
    }

    /// Encode as an SSE event.
    pub fn to_sse(&self) -> Result<String> {
        Ok(encode_data(&serde_json::to_string(self)?))
    }
}
