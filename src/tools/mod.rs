// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Action system for rungpt
//!
//! An action is a named unit of work a model can request from inside a
//! fenced block. Running it yields a lazy stream of output fragments; the
//! executor copies those fragments into the conversation as they arrive.

pub mod builtin;
pub mod executor;

pub use executor::*;

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::invocation::Invocation;
use crate::chat::parameters::Parameters;
use crate::config::settings::ActionsConfig;
use crate::error::{Result, RunGptError};

/// Incremental output of a running action
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Wildcard entry in the enabled-actions list
pub const ALL_ACTIONS: &str = "*";

/// A resolved request to run one action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Action name, matched exactly
    pub name: String,
    pub parameters: Parameters,
    /// Content of the fenced block that carried the invocation
    pub content: String,
    /// The clause text as written
    pub raw: String,
}

impl ActionRequest {
    pub fn new(invocation: &Invocation, raw: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: invocation.name.clone(),
            parameters: invocation.parameters.clone(),
            content: content.into(),
            raw: raw.into(),
        }
    }
}

/// Context provided to actions during execution
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Directory commands run in and relative paths resolve against
    pub working_directory: PathBuf,
    /// Shell used for command actions
    pub shell: String,
    /// Upper bound on a single action's run time
    pub timeout: Option<Duration>,
    /// Remove ANSI escapes from command output
    pub strip_ansi: bool,
}

impl ActionContext {
    pub fn new(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            shell: "sh".to_string(),
            timeout: None,
            strip_ansi: true,
        }
    }

    /// Build a context from the `actions` settings section.
    pub fn from_settings(config: &ActionsConfig) -> Result<Self> {
        let working_directory = match &config.working_directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(Self {
            working_directory,
            shell: config.shell.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            strip_ansi: config.strip_ansi,
        })
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_strip_ansi(mut self, strip_ansi: bool) -> Self {
        self.strip_ansi = strip_ansi;
        self
    }

    /// Resolve a path argument against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory.join(path)
        }
    }
}

/// Trait for implementing actions
#[async_trait]
pub trait Action: Send + Sync {
    /// Name used in invocations
    fn name(&self) -> &str;

    /// One-line description for the system prompt
    fn description(&self) -> &str;

    /// Example tag showing how to invoke the action
    fn usage(&self) -> &str;

    /// Start the action and return its output stream.
    ///
    /// Errors returned here, or yielded by the stream, are reported by the
    /// executor and never abort the conversation.
    async fn invoke(&self, request: ActionRequest, context: &ActionContext) -> Result<OutputStream>;
}

/// Registry of available actions
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Create a registry with all built-in actions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for action in builtin::all() {
            registry.register(action);
        }
        registry
    }

    /// Built-in actions filtered by an enabled list (`"*"` enables all).
    pub fn with_enabled(enabled: &[String]) -> Result<Self> {
        if enabled.iter().any(|name| name == ALL_ACTIONS) {
            return Ok(Self::with_builtins());
        }
        let mut builtins: HashMap<String, Arc<dyn Action>> = builtin::all()
            .into_iter()
            .map(|action| (action.name().to_string(), action))
            .collect();
        let mut registry = Self::new();
        for name in enabled {
            let action = builtins
                .remove(name)
                .ok_or_else(|| RunGptError::Config(format!("unknown action in actions.enabled: {}", name)))?;
            registry.register(action);
        }
        Ok(registry)
    }

    /// Register an action, replacing any action with the same name
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    /// Look up an action by exact name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered actions, sorted by name
    pub fn actions(&self) -> Vec<Arc<dyn Action>> {
        self.names()
            .into_iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an [`OutputStream`] from fixed fragments.
pub fn output_from<I>(fragments: I) -> OutputStream
where
    I: IntoIterator<Item = Result<String>>,
    I::IntoIter: Send + 'static,
{
    Box::pin(futures::stream::iter(fragments))
}
