// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::migration;
use super::Settings;

const SETTINGS_FILE: &str = "settings.json";

impl Settings {
    /// Settings file under the rungpt home directory.
    pub fn default_path() -> PathBuf {
        Self::rungpt_home().join(SETTINGS_FILE)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(target: "rungpt.config", path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let raw: serde_json::Value = serde_json::from_str(&content)?;
        let settings = serde_json::from_value(migration::migrate_on_load(raw))?;
        tracing::debug!(target: "rungpt.config", path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Write settings to `path`.
    ///
    /// Keys this version does not know about survive the write. The file is
    /// replaced atomically so a crash never leaves half a settings file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let current = serde_json::to_value(self)?;
        let merged = match std::fs::read_to_string(path) {
            Ok(existing) => match serde_json::from_str(&existing) {
                Ok(existing) => migration::deep_merge(existing, current),
                Err(e) => {
                    tracing::warn!(target: "rungpt.config", path = %path.display(), error = %e, "replacing unreadable settings file");
                    current
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => current,
            Err(e) => return Err(e.into()),
        };

        let staged = tempfile::NamedTempFile::new_in(&dir)?;
        std::fs::write(staged.path(), serde_json::to_string_pretty(&merged)?)?;
        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// `$RUNGPT_HOME`, or `~/.rungpt`.
    pub fn rungpt_home() -> PathBuf {
        match std::env::var_os("RUNGPT_HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".rungpt"),
        }
    }

    /// Where transcripts go; a relative `driver.transcript_dir` is taken
    /// relative to the rungpt home.
    pub fn transcript_root(&self) -> Option<PathBuf> {
        let dir = self.driver.transcript_dir.as_ref()?;
        if dir.is_absolute() {
            Some(dir.clone())
        } else {
            Some(Self::rungpt_home().join(dir))
        }
    }
}
