// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Invocation parameter lists
//!
//! Parses the text between an invocation's parentheses, e.g.
//! `"Hello", "World", delimiter="_"`, in two passes. The named pass records
//! and strips every `key = value` pair; the positional pass then collects the
//! remaining quoted strings and barewords in order. Quoted strings are
//! skipped as a whole during the named pass, so `"a=b"` stays positional.

use regex::{Captures, Regex};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::GrammarError;

/// Key under which positional values are serialized.
pub const POSITIONAL_KEY: &str = "_";

/// A typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParameterValue {
    /// Type an unquoted token.
    pub fn from_bareword(token: &str) -> Self {
        match token {
            "true" => return ParameterValue::Bool(true),
            "false" => return ParameterValue::Bool(false),
            _ => {}
        }
        let numeric = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
        match token.parse::<f64>() {
            Ok(n) if numeric && n.is_finite() => ParameterValue::Number(n),
            _ => ParameterValue::String(token.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Number(n) => write!(f, "{}", n),
            ParameterValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::String(value.to_string())
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Number(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl Serialize for ParameterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
        match self {
            ParameterValue::Bool(b) => serializer.serialize_bool(*b),
            ParameterValue::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT => {
                serializer.serialize_i64(*n as i64)
            }
            ParameterValue::Number(n) => serializer.serialize_f64(*n),
            ParameterValue::String(s) => serializer.serialize_str(s),
        }
    }
}

/// Parsed parameter list
///
/// Serializes as `{ ...named, "_": [positional] }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub positional: Vec<ParameterValue>,
    pub named: BTreeMap<String, ParameterValue>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Named value, falling back to the positional value at `index`.
    pub fn get(&self, name: &str, index: usize) -> Option<&ParameterValue> {
        self.named.get(name).or_else(|| self.positional.get(index))
    }

    /// Named or positional value rendered as a string.
    pub fn get_string(&self, name: &str, index: usize) -> Option<String> {
        self.get(name, index).map(ToString::to_string)
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.named.len() + 1))?;
        for (key, value) in &self.named {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(POSITIONAL_KEY, &self.positional)?;
        map.end()
    }
}

fn named_pass_regex() -> &'static Regex {
    static NAMED: OnceLock<Regex> = OnceLock::new();
    NAMED.get_or_init(|| {
        Regex::new(
            r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|(\w+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|([^\s,"'=()]+))"#,
        )
        .unwrap()
    })
}

fn positional_regex() -> &'static Regex {
    static POSITIONAL: OnceLock<Regex> = OnceLock::new();
    POSITIONAL.get_or_init(|| {
        Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|([^\s,"'=()]+)"#).unwrap()
    })
}

fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\'", "'")
}

/// Value from a `"double"` / `'single'` / bareword capture group triple.
fn captured_value(caps: &Captures<'_>, first_group: usize) -> Option<ParameterValue> {
    if let Some(m) = caps.get(first_group).or_else(|| caps.get(first_group + 1)) {
        return Some(ParameterValue::String(unescape_quotes(m.as_str())));
    }
    caps.get(first_group + 2)
        .map(|m| ParameterValue::from_bareword(m.as_str()))
}

/// Parse the text between an invocation's parentheses.
pub fn parse_parameters(text: &str) -> Result<Parameters, GrammarError> {
    let mut params = Parameters::new();

    // Named pass: record each pair, then blank it out of the working text.
    let mut remaining = String::with_capacity(text.len());
    let mut copied_to = 0;
    for caps in named_pass_regex().captures_iter(text) {
        let Some(key) = caps.get(1) else {
            continue;
        };
        if key.as_str() == POSITIONAL_KEY {
            return Err(GrammarError::ReservedParameter(key.as_str().to_string()));
        }
        if let Some(value) = captured_value(&caps, 2) {
            params.named.insert(key.as_str().to_string(), value);
        }
        let whole = caps.get(0).map_or(key.range(), |m| m.range());
        remaining.push_str(&text[copied_to..whole.start]);
        remaining.push(' ');
        copied_to = whole.end;
    }
    remaining.push_str(&text[copied_to..]);

    // Positional pass over what is left.
    for caps in positional_regex().captures_iter(&remaining) {
        if let Some(value) = captured_value(&caps, 1) {
            params.positional.push(value);
        }
    }

    Ok(params)
}
