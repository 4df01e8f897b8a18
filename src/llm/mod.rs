// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for rungpt
//!
//! Provider abstraction plus the first two stream stages: SSE framing and
//! delta decoding.

pub mod delta;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod sse;

pub use message::*;
pub use provider::*;
