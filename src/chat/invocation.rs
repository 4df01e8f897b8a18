// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Invocation grammar
//!
//! A fenced block requests actions through its tag:
//!
//! ```text
//! [language];name(arg, key="value")[;name2(...)]*
//! ```
//!
//! Tags with neither `;` nor `(` are ordinary code blocks and are ignored.
//!
//! Known limitation: the tag is split on `;` before any parameter is parsed,
//! so a quoted parameter containing `;` breaks the clause boundaries. For
//! example `sh;shell("a;b")` yields the clauses `shell("a` and `b")`.
//!
//! Blocks tagged `rungpt:action` use a second form: every non-blank line of
//! the content is one `name(params)` invocation.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::chat::fence::ParsedCodeBlock;
use crate::chat::parameters::{parse_parameters, Parameters};
use crate::error::GrammarError;

/// Tag of blocks whose content lines are invocations.
pub const ACTION_BLOCK_TAG: &str = "rungpt:action";

/// A named action reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub name: String,
    pub parameters: Parameters,
}

/// One `;`-separated clause of a tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagClause {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<Invocation>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedInvocationTag {
    pub language: String,
    pub additional: Vec<TagClause>,
}

impl ParsedInvocationTag {
    /// Clauses that carry an invocation, in tag order.
    pub fn invocations(&self) -> impl Iterator<Item = (&Invocation, &str)> {
        self.additional
            .iter()
            .filter_map(|clause| clause.invocation.as_ref().map(|inv| (inv, clause.raw.as_str())))
    }
}

/// A fenced block whose tag encodes at least one clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedTaggedCodeBlock {
    pub block: ParsedCodeBlock,
    pub tag: ParsedInvocationTag,
}

/// Whether a tag uses the invocation grammar at all.
pub fn is_invocation_tag(tag: &str) -> bool {
    tag.contains(';') || tag.contains('(')
}

/// Parse one clause such as `write_file("./a.txt")` or `python`.
pub fn parse_clause(clause: &str) -> Result<TagClause, GrammarError> {
    let raw = clause.trim();
    let invocation = match raw.split_once('(') {
        Some((name, rest)) if !name.trim().is_empty() => {
            let params_text = match rest.rfind(')') {
                Some(close) => &rest[..close],
                None => rest,
            };
            Some(Invocation {
                name: name.trim().to_string(),
                parameters: parse_parameters(params_text)?,
            })
        }
        _ => None,
    };
    Ok(TagClause {
        invocation,
        raw: raw.to_string(),
    })
}

/// Parse a block tag. `Ok(None)` means the tag is not an invocation tag.
pub fn parse_invocation_tag(tag: &str) -> Result<Option<ParsedInvocationTag>, GrammarError> {
    if !is_invocation_tag(tag) {
        return Ok(None);
    }

    let mut fragments = tag.split(';');
    let first = fragments.next().unwrap_or_default();
    let (language, clauses): (&str, Vec<&str>) = if first.contains('(') {
        ("", std::iter::once(first).chain(fragments).collect())
    } else {
        (first.trim(), fragments.collect())
    };

    let additional = clauses
        .into_iter()
        .filter(|clause| !clause.trim().is_empty())
        .map(parse_clause)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(ParsedInvocationTag {
        language: language.to_string(),
        additional,
    }))
}

/// Attach a parsed tag to a block, or drop blocks without one.
pub fn decode_tagged_block(
    block: ParsedCodeBlock,
) -> Result<Option<ParsedTaggedCodeBlock>, GrammarError> {
    Ok(parse_invocation_tag(&block.tag)?.map(|tag| ParsedTaggedCodeBlock { block, tag }))
}

fn action_line_regex() -> &'static Regex {
    static ACTION_LINE: OnceLock<Regex> = OnceLock::new();
    ACTION_LINE.get_or_init(|| Regex::new(r"^\s*(\w+)\s*\((.*)\)\s*$").unwrap())
}

/// Decode the lines of a `rungpt:action` block into one clause per line.
///
/// Every failing line is collected; if any failed, the first error is
/// returned and none of the block's invocations should run.
pub fn decode_action_block(block: &ParsedCodeBlock) -> Result<Vec<TagClause>, GrammarError> {
    let mut clauses = Vec::new();
    let mut errors = Vec::new();

    for (index, line) in block.content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = action_line_regex().captures(line) else {
            errors.push(GrammarError::InvalidActionLine {
                line: index + 1,
                text: line.to_string(),
            });
            continue;
        };
        let params_text = caps.get(2).map_or("", |m| m.as_str());
        match parse_parameters(params_text) {
            Ok(parameters) => clauses.push(TagClause {
                invocation: Some(Invocation {
                    name: caps[1].to_string(),
                    parameters,
                }),
                raw: line.trim().to_string(),
            }),
            Err(err) => errors.push(err),
        }
    }

    if errors.len() > 1 {
        tracing::debug!(
            target: "rungpt.chat.invocation",
            count = errors.len(),
            "action block had several invalid lines"
        );
    }
    match errors.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(clauses),
    }
}
