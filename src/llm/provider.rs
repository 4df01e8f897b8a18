// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and related types
//!
//! A provider turns a completion request into the raw bytes of a streamed
//! response body. Framing and delta decoding happen downstream so every
//! backend shares one pipeline.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::chat::history::ChatHistory;
use crate::error::Result;
use crate::llm::message::ChatMessage;

/// Raw response body chunks, as they arrive off the wire
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "mock")
    fn name(&self) -> &str;

    /// Streaming completion.
    ///
    /// Fails when no response body can be obtained; errors inside the body
    /// surface as stream items.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ByteStream>;
}

/// One message as sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for RequestMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.api_role().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Request for completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Messages in the conversation
    pub messages: Vec<RequestMessage>,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    pub stream: bool,
}

impl CompletionRequest {
    /// Create a new streaming request
    pub fn new(model: impl Into<String>, messages: Vec<RequestMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 1000,
            temperature: 0.5,
            stream: true,
        }
    }

    /// Request carrying the whole chat history
    pub fn from_history(model: impl Into<String>, history: &ChatHistory) -> Self {
        Self::new(
            model,
            history.messages().iter().map(RequestMessage::from).collect(),
        )
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_new() {
        let request = CompletionRequest::new("gpt-3.5-turbo", vec![]);
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.max_tokens, 1000);
        assert!(request.stream);
    }

    #[test]
    fn test_completion_request_chained() {
        let request = CompletionRequest::new("m", vec![])
            .with_max_tokens(42)
            .with_temperature(0.1);
        assert_eq!(request.max_tokens, 42);
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_from_history_maps_roles() {
        let history = ChatHistory::with_messages(vec![
            ChatMessage::system("prompt"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::error("oops"),
        ]);
        let request = CompletionRequest::from_history("m", &history);
        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "system"]);
        assert_eq!(request.messages[1].content, "hi");
    }

    #[test]
    fn test_request_serializes_to_chat_completions_body() {
        let request = CompletionRequest::new(
            "m",
            vec![RequestMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 1000);
    }
}
