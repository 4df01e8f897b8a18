// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! In-memory chat history
//!
//! Messages are addressed by index; indices are assigned in insertion order
//! and never reused. Every mutation is mirrored as a [`ChatEvent`] to the
//! subscriber, if there is one.
//!
//! The event channel is bounded. Mutations stay synchronous: an event that
//! does not fit waits in an ordered backlog, and [`ChatHistory::flush`]
//! waits for the subscriber to make room. Producers that await `flush`
//! after each step therefore run at most one channel's worth ahead of the
//! reader.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::chat::events::ChatEvent;
use crate::error::{Result, RunGptError};
use crate::llm::message::{ActionRecord, ChatMessage};

/// Events the channel holds before producers have to wait
pub const EVENT_BUFFER: usize = 64;

pub type EventSender = mpsc::Sender<ChatEvent>;
pub type EventReceiver = mpsc::Receiver<ChatEvent>;

#[derive(Debug, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
    events: Option<EventSender>,
    backlog: VecDeque<ChatEvent>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a history with initial messages (no events are sent for them).
    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Start sending events to a new receiver, replacing any previous one.
    pub fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.events = Some(tx);
        self.backlog.clear();
        rx
    }

    /// Stop sending events.
    pub fn unsubscribe(&mut self) {
        self.events = None;
        self.backlog.clear();
    }

    fn emit(&mut self, event: ChatEvent) {
        let Some(tx) = &self.events else {
            return;
        };
        if !self.backlog.is_empty() {
            self.backlog.push_back(event);
            return;
        }
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.backlog.push_back(event),
            Err(TrySendError::Closed(_)) => self.receiver_dropped(),
        }
    }

    fn receiver_dropped(&mut self) {
        tracing::trace!(target: "rungpt.chat.history", "event receiver dropped");
        self.events = None;
        self.backlog.clear();
    }

    /// Wait until every backlogged event is in the channel.
    pub async fn flush(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            let Some(tx) = &self.events else {
                self.backlog.clear();
                return;
            };
            if tx.send(event).await.is_err() {
                self.receiver_dropped();
                return;
            }
        }
    }

    /// Events waiting for channel room
    pub fn pending_events(&self) -> usize {
        self.backlog.len()
    }

    /// Report a failure on the event channel.
    pub fn emit_error(&mut self, message: impl Into<String>) {
        self.emit(ChatEvent::error(message));
    }

    fn message_mut(&mut self, index: usize) -> Result<&mut ChatMessage> {
        self.messages
            .get_mut(index)
            .ok_or_else(|| RunGptError::InvalidInput(format!("no message at index {}", index)))
    }

    /// Append a message and return its index.
    pub fn add_message(&mut self, message: ChatMessage) -> usize {
        let index = self.messages.len();
        let event = ChatEvent::Append {
            index,
            append: message.content.clone(),
            role: message.role,
        };
        self.messages.push(message);
        self.emit(event);
        index
    }

    /// Append text to a message that is not yet finalized.
    pub fn append_to_message(&mut self, index: usize, fragment: &str) -> Result<()> {
        let message = self.message_mut(index)?;
        if message.finalized {
            return Err(RunGptError::InvalidInput(format!(
                "message {} is finalized",
                index
            )));
        }
        message.content.push_str(fragment);
        let role = message.role;
        self.emit(ChatEvent::Append {
            index,
            append: fragment.to_string(),
            role,
        });
        Ok(())
    }

    /// Record an action requested by a message. Returns the action's index.
    pub fn add_action(&mut self, index: usize, tool: &str, input: &str) -> Result<usize> {
        let message = self.message_mut(index)?;
        message.actions.push(ActionRecord::new(tool, input));
        Ok(message.actions.len() - 1)
    }

    /// Store an action's output.
    pub fn set_action_result(
        &mut self,
        index: usize,
        action: usize,
        result: impl Into<String>,
    ) -> Result<()> {
        let record = self
            .message_mut(index)?
            .actions
            .get_mut(action)
            .ok_or_else(|| {
                RunGptError::InvalidInput(format!("message {} has no action {}", index, action))
            })?;
        record.result = Some(result.into());
        Ok(())
    }

    /// Mark a message complete and announce its final text and actions.
    pub fn finalize_message(&mut self, index: usize) -> Result<()> {
        let message = self.message_mut(index)?;
        message.finalized = true;
        let event = ChatEvent::Finalize {
            index,
            text: message.content.clone(),
            actions: message.actions.clone(),
            role: message.role,
        };
        self.emit(event);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    pub fn message_exists(&self, index: usize) -> bool {
        index < self.messages.len()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
