// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Cypress JSON parser (module-API results, one entry per spec run).
//!
//! Cypress has its own retry mechanism, so a single test may arrive with
//! multiple attempts; those map directly onto the model's attempt list.

use super::{json_value, split_backtrace, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::{Attempt, Framework, Location, Status, Test, TestResults};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CypressReport {
    runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
struct Run {
    spec: Spec,
    #[serde(default)]
    tests: Vec<CypressTest>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Spec {
    relative: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CypressTest {
    title: Vec<String>,
    state: String,
    #[serde(rename = "displayError")]
    display_error: Option<String>,
    #[serde(default)]
    attempts: Vec<CypressAttempt>,
}

#[derive(Debug, Deserialize)]
struct CypressAttempt {
    state: String,
    /// Milliseconds.
    duration: Option<f64>,
    error: Option<CypressError>,
}

#[derive(Debug, Deserialize)]
struct CypressError {
    name: Option<String>,
    message: Option<String>,
    stack: Option<String>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let looks_like_cypress =
        value.get("runs").is_some_and(|v| v.is_array()) && value.get("totalTests").is_some();
    if !looks_like_cypress {
        return Err(ParseFailure::Mismatch(
            "The JSON does not look like a Cypress report".to_owned(),
        ));
    }

    let report: CypressReport = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not look like a Cypress report: {err}"))
    })?;

    let mut tests = Vec::new();
    let mut other_errors = Vec::new();
    for run in report.runs {
        if let Some(message) = run.error.filter(|message| !message.is_empty()) {
            let mut error = crate::results::OtherError::new(message);
            if let Some(relative) = &run.spec.relative {
                error.location = Some(Location::new(relative.clone(), None));
            }
            other_errors.push(error);
        }
        for test in run.tests {
            tests.push(into_test(test, run.spec.relative.as_deref())?);
        }
    }

    Ok(ParseResult {
        parser: ParserKind::JavaScriptCypress,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::javascript_cypress(), tests, other_errors),
    })
}

fn into_test(cypress: CypressTest, spec: Option<&str>) -> Result<Test, ParseFailure> {
    let name = cypress.title.join(" ");

    let mut attempts = Vec::new();
    for attempt in &cypress.attempts {
        let status = state_to_status(&attempt.state, attempt.error.as_ref(), None)?;
        let mut mapped = Attempt::new(status);
        mapped.duration = attempt
            .duration
            .map(|millis| Duration::from_secs_f64(millis / 1_000.0));
        attempts.push(mapped);
    }
    if attempts.is_empty() {
        attempts.push(Attempt::new(state_to_status(
            &cypress.state,
            None,
            cypress.display_error.as_deref(),
        )?));
    }

    Ok(Test {
        id: None,
        name,
        location: spec.map(|spec| Location::new(spec, None)),
        attempts,
    })
}

fn state_to_status(
    state: &str,
    error: Option<&CypressError>,
    display_error: Option<&str>,
) -> Result<Status, ParseFailure> {
    Ok(match state {
        "passed" => Status::Successful,
        "failed" => {
            let message = error
                .and_then(|e| e.message.clone())
                .or_else(|| display_error.map(str::to_owned));
            let exception = error.and_then(|e| e.name.clone());
            let backtrace = error
                .and_then(|e| e.stack.as_deref())
                .or(display_error)
                .map(split_backtrace)
                .unwrap_or_default();
            Status::failed(message, exception, backtrace)
        }
        "pending" => Status::Pended { message: None },
        "skipped" => Status::Skipped { message: None },
        other => {
            return Err(ParseFailure::Mismatch(format!(
                "Unexpected Cypress test state \"{other}\""
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const REPORT: &str = indoc! {r#"
        {
          "totalTests": 2,
          "totalPassed": 1,
          "totalFailed": 1,
          "runs": [
            {
              "spec": { "relative": "cypress/e2e/widget.cy.js" },
              "tests": [
                {
                  "title": ["widget", "builds"],
                  "state": "passed",
                  "displayError": null,
                  "attempts": [
                    { "state": "passed", "duration": 120, "error": null }
                  ]
                },
                {
                  "title": ["widget", "breaks"],
                  "state": "failed",
                  "displayError": "AssertionError: expected true\n    at widget.cy.js:9",
                  "attempts": [
                    {
                      "state": "failed",
                      "duration": 200,
                      "error": {
                        "name": "AssertionError",
                        "message": "expected true",
                        "stack": "AssertionError: expected true\n    at widget.cy.js:9"
                      }
                    },
                    {
                      "state": "failed",
                      "duration": 180,
                      "error": {
                        "name": "AssertionError",
                        "message": "expected true",
                        "stack": "AssertionError: expected true\n    at widget.cy.js:9"
                      }
                    }
                  ]
                }
              ]
            }
          ]
        }
    "#};

    #[test]
    fn parses_a_report_with_attempts() {
        let result = parse(REPORT).expect("valid cypress json");

        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.test_results.framework, Framework::javascript_cypress());

        let summary = &result.test_results.summary;
        assert_eq!(summary.tests, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retries, 1);

        let failed = &result.test_results.tests[1];
        assert_eq!(failed.name, "widget breaks");
        assert_eq!(failed.attempts.len(), 2);
        assert_eq!(
            failed.location,
            Some(Location::new("cypress/e2e/widget.cy.js", None))
        );
        match failed.effective_status() {
            Status::Failed { message, .. } => {
                assert_eq!(message.as_deref(), Some("expected true"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn spec_level_errors_become_other_errors() {
        let report = indoc! {r#"
            {
              "totalTests": 0,
              "runs": [
                {
                  "spec": { "relative": "cypress/e2e/broken.cy.js" },
                  "tests": [],
                  "error": "Oops...we found an error preparing this test file"
                }
              ]
            }
        "#};
        let result = parse(report).expect("valid cypress json");

        assert_eq!(result.test_results.summary.other_errors, 1);
        assert!(result.test_results.other_errors[0]
            .message
            .contains("error preparing"));
    }

    #[test]
    fn rejects_json_that_is_not_cypress() {
        let err = parse(r#"{"examples": [], "summary_line": ""}"#).expect_err("that is rspec");
        assert!(matches!(err, ParseFailure::Mismatch(_)));
    }
}
