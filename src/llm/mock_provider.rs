// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Replays scripted `text/event-stream` bodies instead of calling a real
//! API. Responses are consumed in order; once the script runs out every
//! call gets an empty completion.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ApiError, Result, RunGptError};
use crate::llm::delta::{DeltaMessage, DONE_SENTINEL};
use crate::llm::provider::{ByteStream, CompletionRequest, LlmProvider};
use crate::llm::sse::encode_data;

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted responses, front first
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Body chunks sent verbatim
    Chunks(Vec<Vec<u8>>),
    /// Body chunks followed by a transport error
    Interrupted {
        chunks: Vec<Vec<u8>>,
        error: ApiError,
    },
    /// The request itself fails; no body
    Fail(ApiError),
}

impl MockResponse {
    /// A well-formed body streaming `fragments` one delta each, then `[DONE]`
    pub fn text<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chunks: Vec<Vec<u8>> = fragments
            .into_iter()
            .map(|fragment| {
                let payload = serde_json::to_string(&DeltaMessage::content(fragment))
                    .unwrap_or_default();
                encode_data(&payload).into_bytes()
            })
            .collect();
        chunks.push(encode_data(DONE_SENTINEL).into_bytes());
        MockResponse::Chunks(chunks)
    }

    /// Raw body text split into the given chunks
    pub fn raw<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockResponse::Chunks(chunks.into_iter().map(|c| c.into().into_bytes()).collect())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider with an empty script
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    /// Queue a response
    pub fn with_response(self, response: MockResponse) -> Self {
        self.push_response(response);
        self
    }

    /// Queue a text response streamed as the given fragments
    pub fn with_text_response<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_response(MockResponse::text(fragments))
    }

    /// Queue a response from a shared handle
    pub fn push_response(&self, response: MockResponse) {
        lock(&self.responses).push_back(response);
    }

    /// Number of scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    /// Get the number of times complete_stream() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Get the next response
    fn next_response(&self) -> MockResponse {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| MockResponse::text(Vec::<String>::new()))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ByteStream> {
        lock(&self.recorded_requests).push(request);

        let items: Vec<Result<Vec<u8>>> = match self.next_response() {
            MockResponse::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            MockResponse::Interrupted { chunks, error } => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(RunGptError::Api(error))))
                .collect(),
            MockResponse::Fail(error) => return Err(RunGptError::Api(error)),
        };

        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn body(provider: &MockProvider) -> Result<String> {
        let mut stream = provider
            .complete_stream(CompletionRequest::new("mock-model", vec![]))
            .await?;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend(chunk?);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    #[tokio::test]
    async fn test_text_response_is_sse() {
        let provider = MockProvider::new().with_text_response(["Hel", "lo"]);
        let text = body(&provider).await.unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.contains("\"content\":\"Hel\""));
        assert!(text.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_responses_consumed_in_order() {
        let provider = MockProvider::new()
            .with_response(MockResponse::raw(["first"]))
            .with_response(MockResponse::raw(["second"]));
        assert_eq!(body(&provider).await.unwrap(), "first");
        assert_eq!(body(&provider).await.unwrap(), "second");
        assert_eq!(body(&provider).await.unwrap(), "data: [DONE]\n\n");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_fail_response() {
        let provider = MockProvider::new().with_response(MockResponse::Fail(ApiError::MissingBody));
        let err = body(&provider).await.unwrap_err();
        assert!(matches!(err, RunGptError::Api(ApiError::MissingBody)));
        assert_eq!(provider.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_response() {
        let provider = MockProvider::new().with_response(MockResponse::Interrupted {
            chunks: vec![b"data: ".to_vec()],
            error: ApiError::StreamError("reset".to_string()),
        });
        let mut stream = provider
            .complete_stream(CompletionRequest::new("m", vec![]))
            .await
            .unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_records_requests() {
        let provider = MockProvider::with_name("scripted");
        let _ = body(&provider).await;
        assert_eq!(provider.name(), "scripted");
        assert_eq!(provider.last_request().unwrap().model, "mock-model");
    }
}
