// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Posts the request with `stream: true` and hands back the raw
//! `text/event-stream` body. Works against any server that speaks the
//! `/chat/completions` dialect.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{ApiError, Result, RunGptError};
use crate::llm::provider::{ByteStream, CompletionRequest, LlmProvider};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create with a custom base URL (without the `/chat/completions` suffix)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Parse an error response
    fn parse_error(&self, status: u16, body: &str) -> RunGptError {
        let parsed = serde_json::from_str::<OpenAiError>(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|e| e.error.code.as_deref())
            .unwrap_or("");

        if status == 401 || code == "invalid_api_key" {
            return RunGptError::Api(ApiError::AuthenticationFailed);
        }
        if status == 429 || code == "rate_limit_exceeded" {
            return RunGptError::Api(ApiError::RateLimited(60));
        }

        let message = match parsed {
            Some(e) => e.error.message,
            None => body.to_string(),
        };
        RunGptError::Api(ApiError::ServerError { status, message })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ByteStream> {
        tracing::debug!(
            target: "rungpt.llm.openai",
            model = %request.model,
            messages = request.messages.len(),
            "posting completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body));
        }

        let byte_stream = response.bytes_stream().map(|result| {
            result
                .map(|bytes| bytes.to_vec())
                .map_err(|e| RunGptError::Api(ApiError::StreamError(e.to_string())))
        });

        Ok(Box::pin(byte_stream))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}
