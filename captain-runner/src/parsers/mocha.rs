// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Mocha JSON parser (`mocha --reporter json`).

use super::{json_value, split_backtrace, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::{Attempt, Framework, Location, Status, Test, TestResults};
use serde::Deserialize;
use std::{collections::HashSet, time::Duration};

#[derive(Debug, Deserialize)]
struct MochaReport {
    tests: Vec<MochaTest>,
    #[serde(default)]
    pending: Vec<MochaTest>,
}

#[derive(Debug, Deserialize)]
struct MochaTest {
    #[serde(rename = "fullTitle")]
    full_title: String,
    file: Option<String>,
    /// Milliseconds; absent for pending tests.
    duration: Option<f64>,
    #[serde(default)]
    err: MochaError,
}

#[derive(Debug, Default, Deserialize)]
struct MochaError {
    message: Option<String>,
    stack: Option<String>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let looks_like_mocha =
        value.get("stats").is_some_and(|v| v.is_object()) && value.get("tests").is_some_and(|v| v.is_array());
    if !looks_like_mocha {
        return Err(ParseFailure::Mismatch(
            "The JSON does not look like a Mocha report".to_owned(),
        ));
    }

    let report: MochaReport = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not look like a Mocha report: {err}"))
    })?;

    let pending: HashSet<String> = report
        .pending
        .into_iter()
        .map(|test| test.full_title)
        .collect();

    let tests = report
        .tests
        .into_iter()
        .map(|test| into_test(test, &pending))
        .collect();

    Ok(ParseResult {
        parser: ParserKind::JavaScriptMocha,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::javascript_mocha(), tests, Vec::new()),
    })
}

fn into_test(mocha: MochaTest, pending: &HashSet<String>) -> Test {
    let status = if let Some(message) = mocha.err.message {
        Status::failed(
            Some(message),
            None,
            mocha
                .err
                .stack
                .as_deref()
                .map(split_backtrace)
                .unwrap_or_default(),
        )
    } else if pending.contains(&mocha.full_title) {
        Status::Pended { message: None }
    } else {
        Status::Successful
    };

    let mut attempt = Attempt::new(status);
    attempt.duration = mocha
        .duration
        .map(|millis| Duration::from_secs_f64(millis / 1_000.0));

    let mut test = Test::new(mocha.full_title, attempt);
    if let Some(file) = mocha.file {
        test.location = Some(Location::new(file, None));
    }
    test
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const REPORT: &str = indoc! {r#"
        {
          "stats": {
            "suites": 1,
            "tests": 3,
            "passes": 1,
            "pending": 1,
            "failures": 1,
            "duration": 42
          },
          "tests": [
            {
              "title": "builds",
              "fullTitle": "widget builds",
              "file": "/project/test/widget.test.js",
              "duration": 12,
              "err": {}
            },
            {
              "title": "breaks",
              "fullTitle": "widget breaks",
              "file": "/project/test/widget.test.js",
              "duration": 7,
              "err": {
                "message": "expected true to equal false",
                "stack": "AssertionError: expected true to equal false\n    at Context.<anonymous>"
              }
            },
            {
              "title": "someday",
              "fullTitle": "widget someday",
              "file": "/project/test/widget.test.js",
              "err": {}
            }
          ],
          "pending": [
            { "title": "someday", "fullTitle": "widget someday", "err": {} }
          ],
          "failures": [
            { "title": "breaks", "fullTitle": "widget breaks", "err": { "message": "expected true to equal false" } }
          ],
          "passes": [
            { "title": "builds", "fullTitle": "widget builds", "err": {} }
          ]
        }
    "#};

    #[test]
    fn parses_a_report() {
        let result = parse(REPORT).expect("valid mocha json");

        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.test_results.framework, Framework::javascript_mocha());

        let summary = &result.test_results.summary;
        assert_eq!(summary.tests, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pended, 1);

        let passed = &result.test_results.tests[0];
        assert_eq!(passed.attempts[0].duration, Some(Duration::from_millis(12)));
        assert_eq!(
            passed.location,
            Some(Location::new("/project/test/widget.test.js", None))
        );

        let failed = &result.test_results.tests[1];
        assert_eq!(
            failed.effective_status(),
            &Status::failed(
                Some("expected true to equal false".to_owned()),
                None,
                vec![
                    "AssertionError: expected true to equal false".to_owned(),
                    "at Context.<anonymous>".to_owned(),
                ],
            )
        );

        let pended = &result.test_results.tests[2];
        assert_eq!(pended.effective_status(), &Status::Pended { message: None });
        assert_eq!(pended.attempts[0].duration, None);
    }

    #[test]
    fn rejects_json_that_is_not_mocha() {
        let err = parse(r#"{"testResults": [], "numTotalTests": 0}"#).expect_err("that is jest");
        assert!(matches!(err, ParseFailure::Mismatch(_)));
    }
}
