// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Cucumber JSON parser (`cucumber --format json`). Scenarios are the
//! unit of reporting; a scenario's status folds over its steps.

use super::{json_value, split_backtrace, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::{Attempt, Framework, Location, Status, Test, TestResults};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Feature {
    uri: String,
    name: Option<String>,
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    id: Option<String>,
    #[serde(rename = "type")]
    element_type: Option<String>,
    name: Option<String>,
    line: Option<u64>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    result: Option<StepResult>,
}

#[derive(Debug, Deserialize)]
struct StepResult {
    status: String,
    /// Nanoseconds.
    duration: Option<u64>,
    error_message: Option<String>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let looks_like_cucumber = value.as_array().is_some_and(|features| {
        !features.is_empty()
            && features
                .iter()
                .all(|feature| feature.get("uri").is_some() && feature.get("elements").is_some())
    });
    if !looks_like_cucumber {
        return Err(ParseFailure::Mismatch(
            "The JSON does not look like a Cucumber report".to_owned(),
        ));
    }

    let features: Vec<Feature> = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not look like a Cucumber report: {err}"))
    })?;

    let mut tests = Vec::new();
    for feature in features {
        for element in feature.elements {
            if element.element_type.as_deref() == Some("background") {
                continue;
            }
            tests.push(into_test(element, &feature.uri, feature.name.as_deref())?);
        }
    }

    Ok(ParseResult {
        parser: ParserKind::RubyCucumber,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::ruby_cucumber(), tests, Vec::new()),
    })
}

fn into_test(element: Element, uri: &str, feature_name: Option<&str>) -> Result<Test, ParseFailure> {
    let mut total_nanos: u64 = 0;
    let mut failure: Option<String> = None;
    let mut pended = false;
    let mut any_passed = false;

    for step in &element.steps {
        let Some(result) = &step.result else { continue };
        total_nanos += result.duration.unwrap_or(0);
        match result.status.as_str() {
            "passed" => any_passed = true,
            "failed" => {
                if failure.is_none() {
                    failure = result
                        .error_message
                        .clone()
                        .or_else(|| Some("step failed".to_owned()));
                }
            }
            "pending" | "undefined" => pended = true,
            "skipped" => {}
            other => {
                return Err(ParseFailure::Mismatch(format!(
                    "Unexpected Cucumber step status \"{other}\""
                )));
            }
        }
    }

    let status = if let Some(message) = failure {
        let backtrace = split_backtrace(&message);
        Status::failed(Some(message), None, backtrace)
    } else if pended {
        Status::Pended { message: None }
    } else if !any_passed && !element.steps.is_empty() {
        Status::Skipped { message: None }
    } else {
        Status::Successful
    };

    let mut attempt = Attempt::new(status);
    if total_nanos > 0 {
        attempt.duration = Some(Duration::from_nanos(total_nanos));
    }

    let scenario = element.name.unwrap_or_default();
    let name = match feature_name {
        Some(feature) => format!("{feature} {scenario}"),
        None => scenario,
    };
    let mut test = Test::new(name, attempt);
    test.id = element.id;
    test.location = Some(Location::new(uri, element.line));
    Ok(test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const REPORT: &str = indoc! {r#"
        [
          {
            "uri": "features/widget.feature",
            "id": "widget",
            "keyword": "Feature",
            "name": "Widget",
            "elements": [
              {
                "id": "widget;builds",
                "keyword": "Scenario",
                "type": "scenario",
                "name": "builds",
                "line": 3,
                "steps": [
                  { "keyword": "Given ", "name": "a widget", "result": { "status": "passed", "duration": 1000000 } },
                  { "keyword": "Then ", "name": "it builds", "result": { "status": "passed", "duration": 2000000 } }
                ]
              },
              {
                "id": "widget;breaks",
                "keyword": "Scenario",
                "type": "scenario",
                "name": "breaks",
                "line": 9,
                "steps": [
                  { "keyword": "Given ", "name": "a widget", "result": { "status": "passed", "duration": 1000000 } },
                  {
                    "keyword": "Then ",
                    "name": "it breaks",
                    "result": {
                      "status": "failed",
                      "duration": 500000,
                      "error_message": "expected it to break (RSpec::Expectations::ExpectationNotMetError)\nfeatures/widget.feature:11"
                    }
                  }
                ]
              },
              {
                "id": "widget;someday",
                "keyword": "Scenario",
                "type": "scenario",
                "name": "someday",
                "line": 14,
                "steps": [
                  { "keyword": "Given ", "name": "nothing yet", "result": { "status": "undefined" } }
                ]
              }
            ]
          }
        ]
    "#};

    #[test]
    fn parses_a_report() {
        let result = parse(REPORT).expect("valid cucumber json");

        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.test_results.framework, Framework::ruby_cucumber());

        let summary = &result.test_results.summary;
        assert_eq!(summary.tests, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pended, 1);

        let passed = &result.test_results.tests[0];
        assert_eq!(passed.id.as_deref(), Some("widget;builds"));
        assert_eq!(passed.name, "Widget builds");
        assert_eq!(
            passed.location,
            Some(Location::new("features/widget.feature", Some(3)))
        );
        assert_eq!(passed.attempts[0].duration, Some(Duration::from_millis(3)));

        let failed = &result.test_results.tests[1];
        match failed.effective_status() {
            Status::Failed { message, .. } => {
                assert!(message.as_deref().unwrap().contains("expected it to break"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn background_elements_are_not_tests() {
        let report = indoc! {r#"
            [
              {
                "uri": "features/widget.feature",
                "name": "Widget",
                "elements": [
                  {
                    "keyword": "Background",
                    "type": "background",
                    "name": "setup",
                    "steps": [ { "result": { "status": "passed" } } ]
                  },
                  {
                    "keyword": "Scenario",
                    "type": "scenario",
                    "name": "builds",
                    "steps": [ { "result": { "status": "passed" } } ]
                  }
                ]
              }
            ]
        "#};
        let result = parse(report).expect("valid cucumber json");
        assert_eq!(result.test_results.tests.len(), 1);
    }

    #[test]
    fn rejects_json_that_is_not_cucumber() {
        let err = parse("[]").expect_err("empty array is not attributable");
        assert!(matches!(err, ParseFailure::Mismatch(_)));

        let err = parse(r#"{"examples": []}"#).expect_err("not an array");
        assert!(matches!(err, ParseFailure::Mismatch(_)));
    }
}
