// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for rungpt
//!
//! Transport failures are fatal for a submission, scan and grammar errors are
//! scoped to a single fenced block, and action failures are recovered by the
//! executor and reported as events.

use thiserror::Error;

/// Main error type for rungpt operations
#[derive(Error, Debug)]
pub enum RunGptError {
    /// API and transport errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Fenced block structure errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Invocation grammar errors
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    /// Action execution errors
    #[error("Action execution failed: {0}")]
    ActionExecution(String),

    /// No action registered under this name
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// The response carried no body to stream
    #[error("Response has no body")]
    MissingBody,

    /// A data payload was not valid JSON
    #[error("Malformed payload {payload:?}: {reason}")]
    MalformedPayload { payload: String, reason: String },

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Errors raised while scanning for fenced blocks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// An opening fence was never closed
    #[error("Unterminated code block {tag:?} opened on line {line}")]
    UnterminatedBlock { tag: String, line: usize },
}

/// Errors raised while parsing invocations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// A line in an action block is not of the form `name(params)`
    #[error("Invalid action on line {line}: {text:?}")]
    InvalidActionLine { line: usize, text: String },

    /// A named parameter used the key reserved for positional values
    #[error("Parameter name {0:?} is reserved")]
    ReservedParameter(String),
}

/// Result type alias for rungpt operations
pub type Result<T> = std::result::Result<T, RunGptError>;

impl RunGptError {
    /// Transport-level failures abort the current submission.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunGptError::Api(_) | RunGptError::Http(_))
    }
}

impl From<RunGptError> for ApiError {
    fn from(err: RunGptError) -> Self {
        match err {
            RunGptError::Api(api) => api,
            other => ApiError::StreamError(other.to_string()),
        }
    }
}
