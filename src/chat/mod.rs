// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation handling
//!
//! The stream stages that turn a model reply into chat history entries, the
//! invocation grammar, and the driver that ties them to the action executor.

pub mod engine;
pub mod events;
pub mod fanout;
pub mod fence;
pub mod history;
pub mod invocation;
pub mod json_field;
pub mod parameters;
pub mod prompt;
pub mod streaming;
pub mod transcript;

pub use engine::{ConversationDriver, DriverOptions, DriverReport};
pub use history::ChatHistory;
