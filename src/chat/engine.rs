// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation driver
//!
//! One submission runs in rounds. Each round scans the new user input for
//! invocations, streams a reply from the model into a fresh assistant
//! message, and executes the blocks found in that reply. Messages the
//! actions add are resubmitted in the next round; a round that adds nothing
//! ends the run, as does reaching the round limit.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::chat::events::ChatEvent;
use crate::chat::fanout::tee;
use crate::chat::fence::{scan_document, FenceScanner, ParsedCodeBlock};
use crate::chat::history::ChatHistory;
use crate::chat::invocation::{decode_action_block, decode_tagged_block, ACTION_BLOCK_TAG};
use crate::chat::streaming::ContentAccumulator;
use crate::chat::transcript::{PromptLog, PromptLogEntry};
use crate::config::{ScanMode, Settings};
use crate::error::{ApiError, Result, RunGptError};
use crate::llm::delta::{decode_deltas, DeltaMessage};
use crate::llm::message::{ChatMessage, ChatRole};
use crate::llm::provider::{ByteStream, CompletionRequest, LlmProvider};
use crate::llm::sse::decode_frames;
use crate::tools::ActionExecutor;
use crate::utils::truncate_for_log;

/// Tunables for one driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Pause before resubmitting action output
    pub resubmit_delay: Duration,
    /// Maximum model submissions per run (None = until quiescent)
    pub max_rounds: Option<usize>,
    pub scan_mode: ScanMode,
    /// Stream only this string field of a JSON reply
    pub json_field: Option<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl DriverOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.provider.model.clone(),
            max_tokens: settings.provider.max_tokens,
            temperature: settings.provider.temperature,
            resubmit_delay: Duration::from_millis(settings.driver.resubmit_delay_ms),
            max_rounds: settings.driver.max_rounds,
            scan_mode: settings.driver.scan_mode,
            json_field: settings.driver.json_field.clone(),
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Model submissions made
    pub rounds: usize,
    /// Messages added to the history, replies included
    pub added_messages: usize,
    /// The run ended at the round limit with unsubmitted messages
    pub stopped_at_limit: bool,
}

/// Drives a conversation between a model and the action executor
pub struct ConversationDriver {
    provider: Arc<dyn LlmProvider>,
    executor: ActionExecutor,
    options: DriverOptions,
    delta_sink: Option<mpsc::UnboundedSender<DeltaMessage>>,
    transcript: Option<PromptLog>,
}

impl ConversationDriver {
    pub fn new(provider: Arc<dyn LlmProvider>, executor: ActionExecutor, options: DriverOptions) -> Self {
        Self {
            provider,
            executor,
            options,
            delta_sink: None,
            transcript: None,
        }
    }

    /// Receive every raw delta of every reply.
    pub fn with_delta_sink(mut self, sink: mpsc::UnboundedSender<DeltaMessage>) -> Self {
        self.delta_sink = Some(sink);
        self
    }

    /// Write prompt/response transcripts.
    pub fn with_transcript(mut self, transcript: PromptLog) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Run a submission of the messages at `input` until no round adds
    /// anything new.
    ///
    /// Transport failures abort the run. Scan, grammar, and action failures
    /// are reported as error events and the run continues.
    pub async fn submit(&self, history: &mut ChatHistory, input: Vec<usize>) -> Result<DriverReport> {
        let start_len = history.len();
        let mut report = DriverReport::default();
        let mut input = input;

        loop {
            report.rounds += 1;
            tracing::info!(
                target: "rungpt.chat.engine",
                round = report.rounds,
                inputs = input.len(),
                "round start"
            );

            let added = self.run_round(history, &input).await;
            history.flush().await;
            let added = added?;

            tracing::info!(
                target: "rungpt.chat.engine",
                round = report.rounds,
                added = added.len(),
                "round end"
            );

            if added.is_empty() {
                break;
            }
            if let Some(max_rounds) = self.options.max_rounds {
                if report.rounds >= max_rounds {
                    tracing::warn!(
                        target: "rungpt.chat.engine",
                        max_rounds,
                        pending = added.len(),
                        "round limit reached"
                    );
                    history.emit_error(format!(
                        "Stopped after {} rounds; {} new messages were not submitted",
                        max_rounds,
                        added.len()
                    ));
                    report.stopped_at_limit = true;
                    history.flush().await;
                    break;
                }
            }

            tokio::time::sleep(self.options.resubmit_delay).await;
            input = added.collect();
        }

        report.added_messages = history.len() - start_len;
        Ok(report)
    }

    /// Run a submission and stream the events it produces.
    ///
    /// Dropping the stream cancels the run: the in-flight request and any
    /// running action are dropped with it. A fatal error ends the stream
    /// with an error event.
    pub fn event_stream<'a>(
        &'a self,
        history: &'a mut ChatHistory,
        input: Vec<usize>,
    ) -> impl Stream<Item = ChatEvent> + 'a {
        enum Step {
            Event(ChatEvent),
            Done(Result<DriverReport>),
        }

        async_stream::stream! {
            let mut events = history.subscribe();
            let outcome = {
                let run = self.submit(history, input);
                futures::pin_mut!(run);
                loop {
                    let step = tokio::select! {
                        biased;
                        Some(event) = events.recv() => Step::Event(event),
                        outcome = &mut run => Step::Done(outcome),
                    };
                    match step {
                        Step::Event(event) => yield event,
                        Step::Done(outcome) => break outcome,
                    }
                }
            };

            while let Ok(event) = events.try_recv() {
                yield event;
            }
            match outcome {
                Ok(report) => tracing::debug!(target: "rungpt.chat.engine", ?report, "submission finished"),
                Err(e) => {
                    tracing::warn!(target: "rungpt.chat.engine", error = %e, "submission failed");
                    yield ChatEvent::error(e.to_string());
                }
            }
            history.unsubscribe();
        }
    }

    /// One round; returns the range of messages the model has not seen yet.
    async fn run_round(&self, history: &mut ChatHistory, input: &[usize]) -> Result<Range<usize>> {
        for &index in input {
            self.scan_input(history, index).await;
        }

        let request = CompletionRequest::from_history(&self.options.model, history)
            .with_max_tokens(self.options.max_tokens)
            .with_temperature(self.options.temperature);
        let entry = self.start_transcript(&request).await;

        let body = match self.provider.complete_stream(request).await {
            Ok(body) => body,
            Err(e) => {
                log_outcome(entry.as_ref(), Err(&e)).await;
                return Err(e);
            }
        };

        let reply = history.add_message(ChatMessage::assistant(""));
        history.flush().await;
        let baseline = history.len();
        let outcome = self.consume_response(history, reply, body).await;
        log_outcome(entry.as_ref(), outcome.as_ref().map(String::as_str)).await;
        outcome?;

        Ok(baseline..history.len())
    }

    /// Execute invocations a user wrote into their own message.
    async fn scan_input(&self, history: &mut ChatHistory, index: usize) {
        let Some(message) = history.get(index) else {
            tracing::warn!(target: "rungpt.chat.engine", index, "input message does not exist");
            return;
        };
        let finalized = message.finalized;

        // Only what a person typed is scanned; action output is not.
        if message.role == ChatRole::User {
            match scan_document(&message.content) {
                Ok(blocks) => {
                    for block in blocks {
                        self.handle_block(history, index, block).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "rungpt.chat.engine", index, error = %e, "input scan failed");
                    history.emit_error(RunGptError::from(e).to_string());
                }
            }
        }

        if !finalized {
            if let Err(e) = history.finalize_message(index) {
                tracing::warn!(target: "rungpt.chat.engine", index, error = %e, "could not finalize input");
            }
        }
        history.flush().await;
    }

    /// Stream a reply into the message at `reply` and run its blocks.
    async fn consume_response(
        &self,
        history: &mut ChatHistory,
        reply: usize,
        body: ByteStream,
    ) -> Result<String> {
        let deltas = decode_deltas(decode_frames(body)).map(|item| item.map_err(ApiError::from));
        let (processed, mut raw) = tee(Box::pin(deltas));

        let sink = self.delta_sink.clone();
        let forward_raw = async move {
            while let Some(item) = raw.next().await {
                let Ok(delta) = item else { break };
                tracing::trace!(target: "rungpt.chat.engine", ?delta, "raw delta");
                if let Some(sink) = &sink {
                    if sink.send(delta).is_err() {
                        tracing::trace!(target: "rungpt.chat.engine", "delta sink closed");
                    }
                }
            }
        };

        let (outcome, ()) = futures::join!(self.stream_reply(history, reply, processed), forward_raw);

        // A failed reply still keeps the text that arrived.
        if let Err(e) = history.finalize_message(reply) {
            tracing::warn!(target: "rungpt.chat.engine", reply, error = %e, "could not finalize reply");
        }
        history.flush().await;
        outcome
    }

    async fn stream_reply<S>(&self, history: &mut ChatHistory, reply: usize, mut deltas: S) -> Result<String>
    where
        S: Stream<Item = std::result::Result<DeltaMessage, ApiError>> + Unpin,
    {
        let mut accumulator = match &self.options.json_field {
            Some(field) => ContentAccumulator::with_json_field(field.clone()),
            None => ContentAccumulator::new(),
        };
        let mut scanner = FenceScanner::new();

        while let Some(item) = deltas.next().await {
            let delta = item.map_err(RunGptError::Api)?;
            let Some(fragment) = accumulator.push(&delta) else {
                continue;
            };
            history.append_to_message(reply, &fragment)?;
            // Wait for the reader before taking the next delta.
            history.flush().await;

            if self.options.scan_mode == ScanMode::Incremental {
                for block in scanner.scan(accumulator.text()) {
                    self.handle_block(history, reply, block).await;
                }
            }
        }

        tracing::debug!(
            target: "rungpt.chat.engine",
            fragments = accumulator.fragments(),
            text = %truncate_for_log(accumulator.text(), 200),
            "reply complete"
        );

        match self.options.scan_mode {
            ScanMode::Incremental => {
                for block in scanner.finish(accumulator.text()) {
                    self.handle_block(history, reply, block).await;
                }
            }
            ScanMode::OnFlush => match scan_document(accumulator.text()) {
                Ok(blocks) => {
                    for block in blocks {
                        self.handle_block(history, reply, block).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "rungpt.chat.engine", error = %e, "reply scan failed");
                    history.emit_error(RunGptError::from(e).to_string());
                    history.flush().await;
                }
            },
        }

        Ok(accumulator.finish().unwrap_or_default())
    }

    async fn handle_block(&self, history: &mut ChatHistory, source: usize, block: ParsedCodeBlock) {
        tracing::debug!(target: "rungpt.chat.engine", tag = %block.tag, source, "closed block");

        if block.tag == ACTION_BLOCK_TAG {
            match decode_action_block(&block) {
                Ok(clauses) => {
                    let requests = self.executor.requests_for(&clauses, "");
                    self.executor.execute_all(history, source, requests).await;
                }
                Err(e) => {
                    tracing::warn!(target: "rungpt.chat.engine", error = %e, "invalid action block");
                    history.emit_error(RunGptError::from(e).to_string());
                    history.flush().await;
                }
            }
            return;
        }

        match decode_tagged_block(block) {
            Ok(Some(tagged)) => {
                self.executor.execute_block(history, source, &tagged).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "rungpt.chat.engine", error = %e, "invalid block tag");
                history.emit_error(RunGptError::from(e).to_string());
                history.flush().await;
            }
        }
    }

    async fn start_transcript(&self, request: &CompletionRequest) -> Option<PromptLogEntry> {
        let log = self.transcript.as_ref()?;
        match log.log_request(request).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(target: "rungpt.chat.transcript", error = %e, "could not write transcript");
                None
            }
        }
    }
}

async fn log_outcome(entry: Option<&PromptLogEntry>, outcome: std::result::Result<&str, &RunGptError>) {
    let Some(entry) = entry else { return };
    let written = match outcome {
        Ok(text) => entry.log_response(text).await,
        Err(e) => entry.log_error(&e.to_string()).await,
    };
    if let Err(e) = written {
        tracing::warn!(target: "rungpt.chat.transcript", error = %e, "could not write transcript");
    }
}
