// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The canonical JSON parser. This is the inverse of the `rwx-v1-json`
//! reporter: any results captain writes can be read back losslessly (up to
//! meta key order).

use super::{json_value, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::TestResults;
use serde::{Deserialize, Serialize};

pub(crate) const SCHEMA_URL: &str =
    "https://raw.githubusercontent.com/rwx-research/test-results-schema/main/v1.json";

/// The on-disk form of the canonical schema: the schema declaration plus the
/// results themselves.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(rename = "$schema")]
    pub(crate) schema: String,
    #[serde(flatten)]
    pub(crate) results: TestResults,
}

impl Document {
    pub(crate) fn new(results: TestResults) -> Self {
        Self {
            schema: SCHEMA_URL.to_owned(),
            results,
        }
    }
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let declares_schema = value
        .get("$schema")
        .and_then(|schema| schema.as_str())
        .is_some_and(|schema| schema.contains("test-results-schema") && schema.contains("v1"));
    if !declares_schema {
        return Err(ParseFailure::Mismatch(
            "The JSON does not declare the test results schema".to_owned(),
        ));
    }

    let document: Document = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not match the test results schema: {err}"))
    })?;

    let mut test_results = document.results;
    // Serde enforces no minimum length on attempt lists, but the rest of the
    // crate relies on every test having at least one attempt.
    if let Some(test) = test_results.tests.iter().find(|test| test.attempts.is_empty()) {
        return Err(ParseFailure::Mismatch(format!(
            "The JSON does not match the test results schema: test \"{}\" has no attempts",
            test.name
        )));
    }
    test_results.refresh_summary();

    Ok(ParseResult {
        parser: ParserKind::RwxJson,
        sentiment: Sentiment::Positive,
        test_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{Attempt, Framework, Location, Status, Test};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn sample_results() -> TestResults {
        let mut failing = Attempt::new(Status::failed(
            Some("boom".to_owned()),
            Some("RuntimeError".to_owned()),
            vec!["a.rb:1".to_owned(), "a.rb:9".to_owned()],
        ));
        failing.duration = Some(Duration::from_nanos(1_524_900_000));
        failing.meta.insert("shard".to_owned(), "2".into());

        let mut retried = Test::new("Widget breaks", failing).with_id("./spec/widget_spec.rb[1:2]");
        retried.attempts.push(Attempt::new(Status::Successful));
        retried.location = Some(Location::new("./spec/widget_spec.rb", Some(9)));

        TestResults::new(
            Framework::ruby_rspec(),
            vec![
                retried,
                Test::new("Widget builds", Attempt::new(Status::Successful)),
            ],
            vec![crate::results::OtherError::new("worker crashed")],
        )
    }

    #[test]
    fn round_trips_through_the_canonical_document() {
        let original = sample_results();
        let encoded =
            serde_json::to_string_pretty(&Document::new(original.clone())).expect("encodes");

        let result = parse(&encoded).expect("canonical json parses");
        assert_eq!(result.parser, ParserKind::RwxJson);
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.test_results, original);
    }

    #[test]
    fn rejects_tests_with_no_attempts() {
        let input = format!(
            r#"{{
                "$schema": "{SCHEMA_URL}",
                "framework": {{ "language": "Ruby", "kind": "RSpec" }},
                "summary": {{
                    "tests": 1, "successful": 0, "failed": 0, "skipped": 0,
                    "pended": 0, "todoNotDone": 0, "timedOut": 0, "canceled": 0,
                    "otherErrors": 0, "retries": 0, "quarantined": 0
                }},
                "tests": [{{ "name": "Widget builds", "attempts": [] }}]
            }}"#
        );

        let err = parse(&input).expect_err("a test with no attempts is malformed");
        match err {
            ParseFailure::Mismatch(message) => assert!(message.contains("has no attempts")),
            other => panic!("expected a mismatch, got {other:?}"),
        }
    }

    #[test]
    fn requires_the_schema_declaration() {
        let results = sample_results();
        let bare = serde_json::to_string(&results).expect("encodes");
        let err = parse(&bare).expect_err("no $schema, no claim");
        assert!(matches!(err, ParseFailure::Mismatch(_)));
    }
}
