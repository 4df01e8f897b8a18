// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming extraction of one JSON string field
//!
//! Some models answer with a JSON object and put the user-facing text in a
//! single string field (`{"action": "Final Answer", "action_input": "..."}`).
//! [`JsonFieldStreamer`] emits the decoded characters of that field as they
//! arrive, one character at a time, without buffering the document.
//!
//! Any string immediately followed by `:` counts as a key, so a matching key
//! at any nesting depth selects its value. Values that are not strings are
//! skipped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    OutsideString,
    EnteringTargetValue,
    InString { emit: bool },
    InEscapedChar { emit: bool },
    InUnicodeEscape { emit: bool, value: u32, digits: u8 },
}

/// Finite-state scanner for the string value of `target`.
#[derive(Debug, Clone)]
pub struct JsonFieldStreamer {
    target: String,
    target_chars: usize,
    state: State,
    /// Last string read outside a target value, capped just past the target length.
    key: String,
    key_chars: usize,
    key_matches: bool,
    high_surrogate: Option<u32>,
}

impl JsonFieldStreamer {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            target_chars: target.chars().count(),
            target,
            state: State::OutsideString,
            key: String::new(),
            key_chars: 0,
            key_matches: false,
            high_surrogate: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Feed a fragment and return the target-field characters it contained.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut out = String::new();
        for c in fragment.chars() {
            self.step(c, &mut out);
        }
        out
    }

    fn step(&mut self, c: char, out: &mut String) {
        match self.state {
            State::OutsideString => match c {
                '"' => {
                    self.key.clear();
                    self.key_chars = 0;
                    self.key_matches = false;
                    self.state = State::InString { emit: false };
                }
                ':' if self.key_matches => {
                    self.key_matches = false;
                    self.state = State::EnteringTargetValue;
                }
                c if c.is_whitespace() => {}
                _ => self.key_matches = false,
            },
            State::EnteringTargetValue => match c {
                '"' => self.state = State::InString { emit: true },
                c if c.is_whitespace() => {}
                _ => {
                    self.state = State::OutsideString;
                    self.step(c, out);
                }
            },
            State::InString { emit } => match c {
                '\\' => self.state = State::InEscapedChar { emit },
                '"' => {
                    self.flush_surrogate(emit, out);
                    self.key_matches = !emit && self.key == self.target;
                    self.state = State::OutsideString;
                }
                c => {
                    self.flush_surrogate(emit, out);
                    self.accept(emit, c, out);
                }
            },
            State::InEscapedChar { emit } => {
                self.state = State::InString { emit };
                let decoded = match c {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    'u' => {
                        self.state = State::InUnicodeEscape {
                            emit,
                            value: 0,
                            digits: 0,
                        };
                        return;
                    }
                    other => other,
                };
                self.flush_surrogate(emit, out);
                self.accept(emit, decoded, out);
            }
            State::InUnicodeEscape { emit, value, digits } => match c.to_digit(16) {
                Some(digit) => {
                    let value = value * 16 + digit;
                    if digits + 1 < 4 {
                        self.state = State::InUnicodeEscape {
                            emit,
                            value,
                            digits: digits + 1,
                        };
                    } else {
                        self.state = State::InString { emit };
                        self.code_unit(emit, value, out);
                    }
                }
                None => {
                    self.state = State::InString { emit };
                    self.accept(emit, char::REPLACEMENT_CHARACTER, out);
                    self.step(c, out);
                }
            },
        }
    }

    fn code_unit(&mut self, emit: bool, unit: u32, out: &mut String) {
        match unit {
            0xD800..=0xDBFF => {
                self.flush_surrogate(emit, out);
                self.high_surrogate = Some(unit);
            }
            0xDC00..=0xDFFF => match self.high_surrogate.take() {
                Some(high) => {
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                    let c = char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER);
                    self.accept(emit, c, out);
                }
                None => self.accept(emit, char::REPLACEMENT_CHARACTER, out),
            },
            _ => {
                self.flush_surrogate(emit, out);
                let c = char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER);
                self.accept(emit, c, out);
            }
        }
    }

    fn flush_surrogate(&mut self, emit: bool, out: &mut String) {
        if self.high_surrogate.take().is_some() {
            self.accept(emit, char::REPLACEMENT_CHARACTER, out);
        }
    }

    fn accept(&mut self, emit: bool, c: char, out: &mut String) {
        if emit {
            out.push(c);
        } else if self.key_chars <= self.target_chars {
            self.key.push(c);
            self.key_chars += 1;
        }
    }
}
