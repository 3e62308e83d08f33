// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Jest JSON parser (`jest --json`).

use super::{json_value, split_backtrace, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::{Attempt, Framework, Location, OtherError, Status, Test, TestResults};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct JestReport {
    #[serde(rename = "testResults")]
    test_results: Vec<FileResult>,
}

#[derive(Debug, Deserialize)]
struct FileResult {
    /// The absolute path of the test file.
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "assertionResults")]
    assertion_results: Vec<AssertionResult>,
}

#[derive(Debug, Deserialize)]
struct AssertionResult {
    #[serde(rename = "fullName")]
    full_name: String,
    status: String,
    /// Milliseconds.
    duration: Option<f64>,
    #[serde(default, rename = "failureMessages")]
    failure_messages: Vec<String>,
    location: Option<JestLocation>,
}

#[derive(Debug, Deserialize)]
struct JestLocation {
    line: Option<u64>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let looks_like_jest =
        value.get("testResults").is_some_and(|v| v.is_array()) && value.get("numTotalTests").is_some();
    if !looks_like_jest {
        return Err(ParseFailure::Mismatch(
            "The JSON does not look like a Jest report".to_owned(),
        ));
    }

    let report: JestReport = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not look like a Jest report: {err}"))
    })?;

    let mut tests = Vec::new();
    let mut other_errors = Vec::new();
    for file in report.test_results {
        // A test file that failed to even run reports a file-level message
        // with no assertions; that failure belongs to no test.
        if file.assertion_results.is_empty() {
            if let Some(message) = file.message.filter(|message| !message.is_empty()) {
                let mut error = OtherError::new(message);
                if let Some(name) = &file.name {
                    error.location = Some(Location::new(name.clone(), None));
                }
                other_errors.push(error);
            }
            continue;
        }
        for assertion in file.assertion_results {
            tests.push(into_test(assertion, file.name.as_deref())?);
        }
    }

    Ok(ParseResult {
        parser: ParserKind::JavaScriptJest,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::javascript_jest(), tests, other_errors),
    })
}

fn into_test(assertion: AssertionResult, file: Option<&str>) -> Result<Test, ParseFailure> {
    let status = match assertion.status.as_str() {
        "passed" | "focused" => Status::Successful,
        "failed" => Status::failed(
            assertion.failure_messages.first().cloned(),
            None,
            assertion
                .failure_messages
                .first()
                .map(|message| split_backtrace(message))
                .unwrap_or_default(),
        ),
        "pending" => Status::Pended { message: None },
        "todo" => Status::TodoNotDone,
        "skipped" | "disabled" => Status::Skipped { message: None },
        other => {
            return Err(ParseFailure::Mismatch(format!(
                "Unexpected Jest assertion status \"{other}\""
            )));
        }
    };

    let mut attempt = Attempt::new(status);
    attempt.duration = assertion
        .duration
        .map(|millis| Duration::from_secs_f64(millis / 1_000.0));

    let mut test = Test::new(assertion.full_name, attempt);
    if let Some(file) = file {
        test.location = Some(Location::new(
            file,
            assertion.location.and_then(|location| location.line),
        ));
    }
    Ok(test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const REPORT: &str = indoc! {r#"
        {
          "numTotalTests": 3,
          "numPassedTests": 1,
          "numFailedTests": 1,
          "success": false,
          "testResults": [
            {
              "name": "/project/widget.test.js",
              "message": "",
              "assertionResults": [
                {
                  "ancestorTitles": ["widget"],
                  "fullName": "widget builds",
                  "status": "passed",
                  "title": "builds",
                  "duration": 12.5,
                  "failureMessages": [],
                  "location": { "line": 4, "column": 3 }
                },
                {
                  "ancestorTitles": ["widget"],
                  "fullName": "widget breaks",
                  "status": "failed",
                  "title": "breaks",
                  "duration": 3,
                  "failureMessages": ["Error: expected true\n    at widget.test.js:9"]
                },
                {
                  "ancestorTitles": ["widget"],
                  "fullName": "widget someday",
                  "status": "todo",
                  "title": "someday",
                  "failureMessages": []
                }
              ]
            }
          ]
        }
    "#};

    #[test]
    fn parses_a_report() {
        let result = parse(REPORT).expect("valid jest json");

        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.test_results.framework, Framework::javascript_jest());

        let summary = &result.test_results.summary;
        assert_eq!(summary.tests, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.todo_not_done, 1);

        let passed = &result.test_results.tests[0];
        assert_eq!(passed.name, "widget builds");
        assert_eq!(
            passed.location,
            Some(Location::new("/project/widget.test.js", Some(4)))
        );
        assert_eq!(
            passed.attempts[0].duration,
            Some(Duration::from_micros(12_500))
        );

        let failed = &result.test_results.tests[1];
        match failed.effective_status() {
            Status::Failed {
                message, backtrace, ..
            } => {
                assert_eq!(message.as_deref(), Some("Error: expected true\n    at widget.test.js:9"));
                assert_eq!(
                    backtrace,
                    &vec!["Error: expected true".to_owned(), "at widget.test.js:9".to_owned()]
                );
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn file_level_failures_become_other_errors() {
        let report = indoc! {r#"
            {
              "numTotalTests": 0,
              "success": false,
              "testResults": [
                {
                  "name": "/project/broken.test.js",
                  "message": "Test suite failed to run\n\nSyntaxError: unexpected token",
                  "assertionResults": []
                }
              ]
            }
        "#};
        let result = parse(report).expect("valid jest json");

        assert_eq!(result.test_results.tests.len(), 0);
        assert_eq!(result.test_results.summary.other_errors, 1);
        assert!(result.test_results.other_errors[0]
            .message
            .contains("Test suite failed to run"));
    }

    #[test]
    fn rejects_json_that_is_not_jest() {
        let err = parse(r#"{"stats": {}, "tests": []}"#).expect_err("that is mocha");
        assert!(matches!(err, ParseFailure::Mismatch(_)));
    }
}
