// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use proptest::prelude::*;
use serde_json::json;

use rungpt::chat::fence::{scan_document, FenceScanner, ParsedCodeBlock};
use rungpt::chat::invocation::{decode_tagged_block, parse_invocation_tag};
use rungpt::chat::parameters::{parse_parameters, ParameterValue};
use rungpt::error::ScanError;

#[test]
fn test_tag_with_language_and_two_invocations() {
    let tag = parse_invocation_tag(r#"python;write_file("a.py");shell("python a.py", timeout=5)"#)
        .unwrap()
        .unwrap();

    assert_eq!(tag.language, "python");
    let names: Vec<&str> = tag.invocations().map(|(inv, _)| inv.name.as_str()).collect();
    assert_eq!(names, vec!["write_file", "shell"]);
    assert_eq!(
        serde_json::to_value(&tag.additional[1]).unwrap(),
        json!({
            "invocation": { "name": "shell", "parameters": { "timeout": 5, "_": ["python a.py"] } },
            "raw": "shell(\"python a.py\", timeout=5)"
        })
    );
}

#[test]
fn test_plain_language_tag_is_not_tagged() {
    let block = ParsedCodeBlock::new("rust", "fn main() {}");
    assert!(decode_tagged_block(block).unwrap().is_none());
}

#[test]
fn test_semicolon_inside_quotes_splits_clause() {
    let tag = parse_invocation_tag(r#"sh;shell("a;b")"#).unwrap().unwrap();
    let raws: Vec<&str> = tag.additional.iter().map(|c| c.raw.as_str()).collect();
    assert_eq!(raws, vec!["shell(\"a", "b\")"]);
}

#[test]
fn test_named_values_are_not_repeated_positionally() {
    let params = parse_parameters(r#"'x', mode="fast", 3, flag=true"#).unwrap();
    assert_eq!(params.positional, vec![ParameterValue::from("x"), ParameterValue::from(3.0)]);
    assert_eq!(params.named.get("mode"), Some(&ParameterValue::from("fast")));
    assert_eq!(params.named.get("flag"), Some(&ParameterValue::Bool(true)));
}

#[test]
fn test_escaped_quotes_unescaped() {
    let params = parse_parameters(r#""say \"hi\"", q='it\'s'"#).unwrap();
    assert_eq!(params.positional, vec![ParameterValue::from("say \"hi\"")]);
    assert_eq!(params.named.get("q"), Some(&ParameterValue::from("it's")));
}

#[test]
fn test_one_shot_scan_rejects_unclosed_fence() {
    let text = "intro\n```sh\nls\n```\n\n```python\nprint(1)\n";
    assert_eq!(
        scan_document(text),
        Err(ScanError::UnterminatedBlock {
            tag: "python".to_string(),
            line: 6
        })
    );
}

#[test]
fn test_incremental_scan_waits_for_close() {
    let full = "a\n```sh;shell()\nls\n```\nb\n";
    let mut scanner = FenceScanner::new();
    let mut seen = Vec::new();
    for end in 1..=full.len() {
        seen.extend(scanner.scan(&full[..end]));
    }
    assert_eq!(seen, vec![ParsedCodeBlock::new("sh;shell()", "ls")]);
}

proptest! {
    #[test]
    fn prop_incremental_matches_one_shot(
        blocks in proptest::collection::vec(("[a-z]{0,6}", "[a-z ]{0,12}"), 0..4),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let mut text = String::from("preamble\n");
        for (tag, body) in &blocks {
            text.push_str(&format!("```{}\n{}\n```\nbetween\n", tag, body));
        }

        let expected = scan_document(&text).unwrap();

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(text.len() + 1)).collect();
        points.push(text.len());
        points.sort_unstable();

        let mut scanner = FenceScanner::new();
        let mut seen = Vec::new();
        for point in points {
            seen.extend(scanner.scan(&text[..point]));
        }
        seen.extend(scanner.finish(&text));

        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn prop_positional_barewords_round_trip(words in proptest::collection::vec("[a-z][a-z0-9]{0,8}", 0..6)) {
        let params = parse_parameters(&words.join(", ")).unwrap();
        prop_assert!(params.named.is_empty());
        let parsed: Vec<String> = params.positional.iter().map(|v| v.to_string()).collect();
        prop_assert_eq!(parsed, words);
    }
}
