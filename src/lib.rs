// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! rungpt - a chat model that runs actions.
//!
//! A model reply streams in as server-sent events. Fenced code blocks whose
//! info string names an action (`sh;shell()`) are executed, their output is
//! added to the conversation, and the conversation is resubmitted until the
//! model stops asking for actions.
//!
//! Architecture highlights:
//! - `llm`: provider abstraction, SSE framing, delta decoding
//! - `chat`: accumulation, fence scanning, invocation grammar, chat history, driver
//! - `tools`: the `Action` trait, builtin actions, and the executor
//! - `config`: JSON settings on disk

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod tools;
pub mod utils;

pub use error::{Result, RunGptError};
