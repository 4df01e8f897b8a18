// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Default system prompt
//!
//! Teaches the model the fenced-block invocation grammar and lists the
//! actions it may call.

use crate::chat::fence::FENCE_MARKER;
use crate::chat::history::ChatHistory;
use crate::chat::invocation::ACTION_BLOCK_TAG;
use crate::llm::message::ChatMessage;
use crate::tools::ActionRegistry;

/// Build the system prompt for a conversation with `registry`'s actions.
pub fn system_prompt(registry: &ActionRegistry) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant that can run actions on the user's machine.\n\n",
    );

    if registry.is_empty() {
        prompt.push_str("No actions are available in this conversation.\n");
        return prompt;
    }

    prompt.push_str(&format!(
        "## Running actions\n\
         Put the invocation in the info string of a fenced code block, after the language:\n\
         {fence}language;name(\"positional\", key=\"value\")\n\
         block content\n\
         {fence}\n\
         Several invocations can follow the language, separated by `;`.\n\
         To call actions without a body, list one invocation per line in a `{tag}` block.\n\
         The output of each action is added to the conversation as a new message.\n\n\
         ## Available actions\n",
        fence = FENCE_MARKER,
        tag = ACTION_BLOCK_TAG,
    ));

    let mut actions = registry.actions();
    actions.sort_by(|a, b| a.name().cmp(b.name()));
    for action in actions {
        prompt.push_str(&format!(
            "- {}: {} (e.g. `{}`)\n",
            action.name(),
            action.description(),
            action.usage()
        ));
    }

    prompt
}

/// A history seeded with the system prompt, or with `custom` when given.
pub fn initial_history(registry: &ActionRegistry, custom: Option<&str>) -> ChatHistory {
    let prompt = match custom {
        Some(prompt) => prompt.to_string(),
        None => system_prompt(registry),
    };
    let mut message = ChatMessage::system(prompt);
    message.finalized = true;
    ChatHistory::with_messages(vec![message])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_builtins() {
        let prompt = system_prompt(&ActionRegistry::with_builtins());
        assert!(prompt.contains("- read_file:"));
        assert!(prompt.contains("- shell:"));
        assert!(prompt.contains("- write_file:"));
        assert!(prompt.contains(ACTION_BLOCK_TAG));
        assert!(prompt.find("- read_file").unwrap() < prompt.find("- shell").unwrap());
    }

    #[test]
    fn test_prompt_without_actions() {
        let prompt = system_prompt(&ActionRegistry::new());
        assert!(prompt.contains("No actions are available"));
        assert!(!prompt.contains("## Available actions"));
    }

    #[test]
    fn test_initial_history() {
        let registry = ActionRegistry::with_builtins();
        let history = initial_history(&registry, None);
        assert_eq!(history.len(), 1);
        assert!(history.get(0).unwrap().finalized);
        assert!(history.get(0).unwrap().content.contains("read_file"));

        let custom = initial_history(&registry, Some("Be brief."));
        assert_eq!(custom.get(0).unwrap().content, "Be brief.");
    }
}
