// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Action execution engine
//!
//! Runs recognized invocations one at a time, in the order given. Each run
//! gets a fresh system message that receives the action's output as it
//! streams. Failures are logged and reported as error events; they never
//! propagate to the caller.

use futures::StreamExt;
use std::sync::Arc;

use crate::chat::history::ChatHistory;
use crate::chat::invocation::{ParsedTaggedCodeBlock, TagClause};
use crate::error::Result;
use crate::llm::message::ChatMessage;

use super::{Action, ActionContext, ActionRegistry, ActionRequest};

/// What happened to one executed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Index of the message holding the action's output
    pub message_index: usize,
    pub succeeded: bool,
}

/// Action executor bound to a registry and an execution context
pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    context: ActionContext,
}

impl ActionExecutor {
    /// Create a new executor
    pub fn new(registry: Arc<ActionRegistry>, context: ActionContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    /// Requests for the clauses that name a registered action.
    ///
    /// Unknown names are skipped; they are inert text, not errors.
    pub fn requests_for<'a, I>(&self, clauses: I, content: &str) -> Vec<ActionRequest>
    where
        I: IntoIterator<Item = &'a TagClause>,
    {
        clauses
            .into_iter()
            .filter_map(|clause| clause.invocation.as_ref().map(|inv| (inv, clause.raw.as_str())))
            .filter(|(invocation, _)| {
                let known = self.registry.contains(&invocation.name);
                if !known {
                    tracing::debug!(
                        target: "rungpt.tools.executor",
                        name = %invocation.name,
                        "ignoring unknown action"
                    );
                }
                known
            })
            .map(|(invocation, raw)| ActionRequest::new(invocation, raw, content))
            .collect()
    }

    /// Execute every recognized invocation of a tagged block.
    pub async fn execute_block(
        &self,
        history: &mut ChatHistory,
        source_index: usize,
        block: &ParsedTaggedCodeBlock,
    ) -> Vec<ActionOutcome> {
        let requests = self.requests_for(&block.tag.additional, &block.block.content);
        self.execute_all(history, source_index, requests).await
    }

    /// Execute requests sequentially, each to completion before the next.
    pub async fn execute_all(
        &self,
        history: &mut ChatHistory,
        source_index: usize,
        requests: Vec<ActionRequest>,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            if let Some(outcome) = self.execute(history, source_index, request).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Execute one request on behalf of the message at `source_index`.
    ///
    /// Returns `None` when no action has the requested name.
    pub async fn execute(
        &self,
        history: &mut ChatHistory,
        source_index: usize,
        request: ActionRequest,
    ) -> Option<ActionOutcome> {
        let action = self.registry.get(&request.name)?;
        let name = request.name.clone();

        let action_index = match history.add_action(source_index, &request.name, &request.raw) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!(target: "rungpt.tools.executor", error = %e, "could not record action");
                None
            }
        };
        let message_index = history.add_message(ChatMessage::system(""));
        history.flush().await;

        tracing::info!(
            target: "rungpt.tools.executor",
            action = %name,
            source = source_index,
            output = message_index,
            "action start"
        );

        let outcome = self.drain(action, request, history, message_index).await;
        if let Err(e) = &outcome {
            tracing::warn!(target: "rungpt.tools.executor", action = %name, error = %e, "action failed");
            history.emit_error(e.to_string());
        }

        let output = history
            .get(message_index)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        tracing::info!(
            target: "rungpt.tools.executor",
            action = %name,
            bytes = output.len(),
            ok = outcome.is_ok(),
            "action end"
        );

        if let Some(action_index) = action_index {
            if let Err(e) = history.set_action_result(source_index, action_index, output) {
                tracing::warn!(target: "rungpt.tools.executor", error = %e, "could not store action result");
            }
        }
        if let Err(e) = history.finalize_message(message_index) {
            tracing::warn!(target: "rungpt.tools.executor", error = %e, "could not finalize output");
        }
        history.flush().await;

        Some(ActionOutcome {
            message_index,
            succeeded: outcome.is_ok(),
        })
    }

    async fn drain(
        &self,
        action: Arc<dyn Action>,
        request: ActionRequest,
        history: &mut ChatHistory,
        message_index: usize,
    ) -> Result<()> {
        let mut output = action.invoke(request, &self.context).await?;
        while let Some(fragment) = output.next().await {
            history.append_to_message(message_index, &fragment?)?;
            history.flush().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::events::ChatEvent;
    use crate::chat::fence::ParsedCodeBlock;
    use crate::chat::history::EventReceiver;
    use crate::chat::invocation::decode_tagged_block;
    use crate::error::RunGptError;
    use crate::llm::message::ChatRole;
    use crate::tools::{output_from, OutputStream};
    use async_trait::async_trait;
    use std::path::PathBuf;

    /// Echoes its first parameter, then optionally fails.
    struct EchoAction {
        fail_after: bool,
    }

    #[async_trait]
    impl Action for EchoAction {
        fn name(&self) -> &str {
            if self.fail_after {
                "flaky"
            } else {
                "echo"
            }
        }

        fn description(&self) -> &str {
            "test action"
        }

        fn usage(&self) -> &str {
            "echo(\"text\")"
        }

        async fn invoke(&self, request: ActionRequest, _context: &ActionContext) -> Result<OutputStream> {
            let text = request.parameters.get_string("text", 0).unwrap_or_default();
            let mut items = vec![Ok(text), Ok("!".to_string())];
            if self.fail_after {
                items.push(Err(RunGptError::ActionExecution("broke".to_string())));
            }
            Ok(output_from(items))
        }
    }

    struct RefusingAction;

    #[async_trait]
    impl Action for RefusingAction {
        fn name(&self) -> &str {
            "refuse"
        }

        fn description(&self) -> &str {
            "always fails to start"
        }

        fn usage(&self) -> &str {
            "refuse()"
        }

        async fn invoke(&self, _request: ActionRequest, _context: &ActionContext) -> Result<OutputStream> {
            Err(RunGptError::ActionExecution("refused".to_string()))
        }
    }

    fn executor() -> ActionExecutor {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(EchoAction { fail_after: false }));
        registry.register(Arc::new(EchoAction { fail_after: true }));
        registry.register(Arc::new(RefusingAction));
        ActionExecutor::new(Arc::new(registry), ActionContext::new(PathBuf::from(".")))
    }

    fn tagged(tag: &str, content: &str) -> ParsedTaggedCodeBlock {
        decode_tagged_block(ParsedCodeBlock::new(tag, content))
            .unwrap()
            .unwrap()
    }

    fn drain_events(rx: &mut EventReceiver) -> Vec<ChatEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_executes_in_order_and_records_results() {
        let executor = executor();
        let mut history = ChatHistory::new();
        let source = history.add_message(ChatMessage::assistant("reply"));

        let block = tagged("txt;echo(\"a\");unknown(1);echo(\"b\")", "body");
        let outcomes = executor.execute_block(&mut history, source, &block).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.succeeded));
        assert_eq!(history.len(), 3);
        assert_eq!(history.get(1).unwrap().content, "a!");
        assert_eq!(history.get(2).unwrap().content, "b!");
        assert_eq!(history.get(1).unwrap().role, ChatRole::System);
        assert!(history.get(2).unwrap().finalized);

        let actions = &history.get(source).unwrap().actions;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].input, "echo(\"a\")");
        assert_eq!(actions[0].result.as_deref(), Some("a!"));
        assert_eq!(actions[1].result.as_deref(), Some("b!"));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let executor = executor();
        let mut history = ChatHistory::new();
        let source = history.add_message(ChatMessage::assistant("reply"));
        let mut rx = history.subscribe();

        let block = tagged("flaky(\"partial\");refuse();echo(\"after\")", "");
        let outcomes = executor.execute_block(&mut history, source, &block).await;

        assert_eq!(
            outcomes.iter().map(|o| o.succeeded).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        assert_eq!(history.get(1).unwrap().content, "partial!");
        assert_eq!(history.get(2).unwrap().content, "");
        assert!(history.get(2).unwrap().finalized);
        assert_eq!(history.get(3).unwrap().content, "after!");

        let errors: Vec<String> = drain_events(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                ChatEvent::Error { message } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("broke"));
        assert!(errors[1].contains("refused"));
    }

    #[tokio::test]
    async fn test_output_streams_into_placeholder() {
        let executor = executor();
        let mut history = ChatHistory::new();
        let source = history.add_message(ChatMessage::user("q"));
        let mut rx = history.subscribe();

        executor
            .execute_block(&mut history, source, &tagged("echo(\"x\")", ""))
            .await;

        let events = drain_events(&mut rx);
        let kinds: Vec<(&str, Option<usize>)> = events
            .iter()
            .map(|event| match event {
                ChatEvent::Append { append, index, .. } => (append.as_str(), Some(*index)),
                ChatEvent::Finalize { text, index, .. } => (text.as_str(), Some(*index)),
                ChatEvent::Error { message } => (message.as_str(), None),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![("", Some(1)), ("x", Some(1)), ("!", Some(1)), ("x!", Some(1))]
        );
        assert!(matches!(events.last(), Some(ChatEvent::Finalize { .. })));
    }

    #[tokio::test]
    async fn test_case_sensitive_names() {
        let executor = executor();
        let mut history = ChatHistory::new();
        let source = history.add_message(ChatMessage::assistant("reply"));
        let outcomes = executor
            .execute_block(&mut history, source, &tagged("Echo(\"x\")", ""))
            .await;
        assert!(outcomes.is_empty());
        assert_eq!(history.len(), 1);
        assert!(history.get(source).unwrap().actions.is_empty());
    }

    #[test]
    fn test_requests_carry_block_content() {
        let executor = executor();
        let block = tagged("sh;echo(1);bare", "content");
        let requests = executor.requests_for(&block.tag.additional, &block.block.content);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content, "content");
        assert_eq!(requests[0].raw, "echo(1)");
    }
}
