// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{Result, RunGptError};
use crate::tools::ActionRegistry;

use super::Settings;

impl Settings {
    /// Get the API key, checking the env var first.
    pub fn api_key(&self) -> Option<String> {
        // Priority: env var > config file.
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.provider.api_key.clone())
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.provider.model.trim().is_empty() {
            return Err(RunGptError::Config("provider.model must not be empty".to_string()));
        }
        if !(self.provider.base_url.starts_with("http://")
            || self.provider.base_url.starts_with("https://"))
        {
            return Err(RunGptError::Config(format!(
                "provider.base_url must be an http(s) URL, got {:?}",
                self.provider.base_url
            )));
        }
        if self.provider.max_tokens == 0 {
            return Err(RunGptError::Config("provider.max_tokens must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(RunGptError::Config(format!(
                "provider.temperature must be between 0 and 2, got {}",
                self.provider.temperature
            )));
        }
        if self.driver.max_rounds == Some(0) {
            return Err(RunGptError::Config(
                "driver.max_rounds must be positive or null".to_string(),
            ));
        }
        if let Some(field) = &self.driver.json_field {
            if field.is_empty() {
                return Err(RunGptError::Config("driver.json_field must not be empty".to_string()));
            }
        }
        if self.actions.shell.trim().is_empty() {
            return Err(RunGptError::Config("actions.shell must not be empty".to_string()));
        }
        if self.actions.timeout_secs == Some(0) {
            return Err(RunGptError::Config("actions.timeout_secs must be positive".to_string()));
        }
        ActionRegistry::with_enabled(&self.actions.enabled)?;
        Ok(())
    }
}
