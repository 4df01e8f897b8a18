// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for rungpt
//!
//! Handles loading and saving settings from ~/.rungpt/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tools::ALL_ACTIONS;

mod io;
mod migration;
mod validation;

/// Main settings structure, stored in ~/.rungpt/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Model endpoint and sampling settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Conversation driver settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// Action execution settings
    #[serde(default)]
    pub actions: ActionsConfig,

    /// Conversation seeding
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// OpenAI-compatible endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Base URL, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// When closed fenced blocks are looked for in a streamed reply
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Scan the full reply once the stream ends
    #[default]
    OnFlush,
    /// Scan after every fragment; blocks run as soon as they close
    Incremental,
}

/// Conversation driver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    #[serde(default)]
    pub scan_mode: ScanMode,

    /// Pause before resubmitting new messages to the model
    #[serde(default = "default_resubmit_delay_ms")]
    pub resubmit_delay_ms: u64,

    /// Upper bound on model submissions per driver run (None = unlimited)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: Option<usize>,

    /// Only stream the value of this string field from JSON replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_field: Option<String>,

    /// Directory for prompt/response transcripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_dir: Option<PathBuf>,
}

/// Action execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionsConfig {
    /// Enabled action names (`"*"` enables every builtin)
    #[serde(default = "default_enabled_actions")]
    pub enabled: Vec<String>,

    /// Shell used by the `shell` action
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Working directory (None = current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    /// Per-action timeout in seconds (None = no timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Strip ANSI escapes from command output
    #[serde(default = "default_true")]
    pub strip_ansi: bool,
}

/// Conversation seeding configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConversationConfig {
    /// Replaces the generated system prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.5
}

fn default_resubmit_delay_ms() -> u64 {
    500
}

fn default_max_rounds() -> Option<usize> {
    Some(16)
}

fn default_enabled_actions() -> Vec<String> {
    vec![ALL_ACTIONS.to_string()]
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::default(),
            resubmit_delay_ms: default_resubmit_delay_ms(),
            max_rounds: default_max_rounds(),
            json_field: None,
            transcript_dir: None,
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_actions(),
            shell: default_shell(),
            working_directory: None,
            timeout_secs: None,
            strip_ansi: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.provider.model, "gpt-3.5-turbo");
        assert_eq!(settings.provider.max_tokens, 1000);
        assert_eq!(settings.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(settings.driver.scan_mode, ScanMode::OnFlush);
        assert_eq!(settings.driver.max_rounds, Some(16));
        assert_eq!(settings.actions.enabled, vec!["*".to_string()]);
        assert!(settings.actions.strip_ansi);
        assert!(settings.conversation.system_prompt.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"provider": {"model": "gpt-4o"}, "driver": {"scan_mode": "incremental"}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.provider.model, "gpt-4o");
        assert_eq!(settings.provider.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.driver.scan_mode, ScanMode::Incremental);
        assert_eq!(settings.driver.resubmit_delay_ms, 500);
        assert_eq!(settings.actions.shell, "sh");
    }

    #[test]
    fn test_null_max_rounds_is_unlimited() {
        let settings: Settings = serde_json::from_str(r#"{"driver": {"max_rounds": null}}"#).unwrap();
        assert_eq!(settings.driver.max_rounds, None);
    }

    #[test]
    fn test_scan_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&ScanMode::OnFlush).unwrap(),
            "\"on_flush\""
        );
        assert_eq!(
            serde_json::to_string(&ScanMode::Incremental).unwrap(),
            "\"incremental\""
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.provider.model = "local-model".to_string();
        settings.driver.json_field = Some("answer".to_string());
        settings.actions.timeout_secs = Some(30);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Settings::load_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"custom": {"keep": true}, "provider": {"extra": 1}}"#).unwrap();

        Settings::default().save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["custom"]["keep"], true);
        assert_eq!(raw["provider"]["extra"], 1);
        assert_eq!(raw["provider"]["model"], "gpt-3.5-turbo");
    }

    #[test]
    fn test_load_invalid_json_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
