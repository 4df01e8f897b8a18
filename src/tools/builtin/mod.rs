// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Built-in actions for rungpt

mod file_read;
mod file_write;
mod shell;

pub use file_read::FileReadAction;
pub use file_write::FileWriteAction;
pub use shell::ShellAction;

use std::sync::Arc;

use super::Action;

/// Every built-in action
pub fn all() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(FileReadAction),
        Arc::new(FileWriteAction),
        Arc::new(ShellAction::new()),
    ]
}
