// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RSpec JSON parser (`rspec --format json`).

use super::{json_value, seconds_to_duration, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::{Attempt, Framework, Location, OtherError, Status, Test, TestResults};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RspecReport {
    examples: Vec<Example>,
    summary: RspecSummary,
}

#[derive(Debug, Deserialize)]
struct Example {
    id: Option<String>,
    full_description: String,
    status: String,
    file_path: Option<String>,
    line_number: Option<u64>,
    run_time: Option<f64>,
    pending_message: Option<String>,
    exception: Option<Exception>,
}

#[derive(Debug, Deserialize)]
struct Exception {
    class: Option<String>,
    message: Option<String>,
    #[serde(default)]
    backtrace: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RspecSummary {
    #[serde(default)]
    errors_outside_of_examples_count: usize,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let looks_like_rspec = value.get("examples").is_some_and(|v| v.is_array())
        && value.get("summary_line").is_some_and(|v| v.is_string());
    if !looks_like_rspec {
        return Err(ParseFailure::Mismatch(
            "The JSON does not look like an RSpec report".to_owned(),
        ));
    }

    let report: RspecReport = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not look like an RSpec report: {err}"))
    })?;

    let tests = report
        .examples
        .into_iter()
        .map(into_test)
        .collect::<Result<Vec<_>, _>>()?;

    let mut other_errors = Vec::new();
    if report.summary.errors_outside_of_examples_count > 0 {
        other_errors.push(OtherError::new(format!(
            "{} error(s) occurred outside of examples",
            report.summary.errors_outside_of_examples_count
        )));
    }

    Ok(ParseResult {
        parser: ParserKind::RubyRspec,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::ruby_rspec(), tests, other_errors),
    })
}

fn into_test(example: Example) -> Result<Test, ParseFailure> {
    let status = match example.status.as_str() {
        "passed" => Status::Successful,
        "failed" => {
            let exception = example.exception.as_ref();
            Status::failed(
                exception.and_then(|e| e.message.clone()),
                exception.and_then(|e| e.class.clone()),
                exception
                    .and_then(|e| e.backtrace.clone())
                    .unwrap_or_default(),
            )
        }
        "pending" => Status::Pended {
            message: example.pending_message.clone(),
        },
        other => {
            return Err(ParseFailure::Mismatch(format!(
                "Unexpected RSpec example status \"{other}\""
            )));
        }
    };

    let mut attempt = Attempt::new(status);
    attempt.duration = example.run_time.map(seconds_to_duration);

    let mut test = Test::new(example.full_description, attempt);
    test.id = example.id;
    if let Some(file) = example.file_path {
        test.location = Some(Location::new(file, example.line_number));
    }
    Ok(test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const REPORT: &str = indoc! {r#"
        {
          "version": "3.12.0",
          "examples": [
            {
              "id": "./spec/widget_spec.rb[1:1]",
              "description": "builds",
              "full_description": "Widget builds",
              "status": "passed",
              "file_path": "./spec/widget_spec.rb",
              "line_number": 4,
              "run_time": 0.0123,
              "pending_message": null
            },
            {
              "id": "./spec/widget_spec.rb[1:2]",
              "description": "breaks",
              "full_description": "Widget breaks",
              "status": "failed",
              "file_path": "./spec/widget_spec.rb",
              "line_number": 9,
              "run_time": 0.2,
              "pending_message": null,
              "exception": {
                "class": "RSpec::Expectations::ExpectationNotMetError",
                "message": "expected true, got false",
                "backtrace": ["./spec/widget_spec.rb:10", "./lib/widget.rb:3"]
              }
            },
            {
              "id": "./spec/widget_spec.rb[1:3]",
              "description": "someday",
              "full_description": "Widget someday",
              "status": "pending",
              "file_path": "./spec/widget_spec.rb",
              "line_number": 14,
              "run_time": 0.0001,
              "pending_message": "Not yet implemented"
            }
          ],
          "summary": {
            "duration": 0.25,
            "example_count": 3,
            "failure_count": 1,
            "pending_count": 1,
            "errors_outside_of_examples_count": 0
          },
          "summary_line": "3 examples, 1 failure, 1 pending"
        }
    "#};

    #[test]
    fn parses_a_report() {
        let result = parse(REPORT).expect("valid rspec json");

        assert_eq!(result.parser, ParserKind::RubyRspec);
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.test_results.framework, Framework::ruby_rspec());

        let summary = &result.test_results.summary;
        assert_eq!(summary.tests, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pended, 1);

        let passed = &result.test_results.tests[0];
        assert_eq!(passed.id.as_deref(), Some("./spec/widget_spec.rb[1:1]"));
        assert_eq!(passed.name, "Widget builds");
        assert_eq!(
            passed.location,
            Some(Location::new("./spec/widget_spec.rb", Some(4)))
        );
        assert_eq!(
            passed.attempts[0].duration,
            Some(Duration::from_nanos(12_300_000))
        );

        let failed = &result.test_results.tests[1];
        assert_eq!(
            failed.effective_status(),
            &Status::failed(
                Some("expected true, got false".to_owned()),
                Some("RSpec::Expectations::ExpectationNotMetError".to_owned()),
                vec!["./spec/widget_spec.rb:10".to_owned(), "./lib/widget.rb:3".to_owned()],
            )
        );

        let pending = &result.test_results.tests[2];
        assert_eq!(
            pending.effective_status(),
            &Status::Pended {
                message: Some("Not yet implemented".to_owned())
            }
        );
    }

    #[test]
    fn counts_errors_outside_of_examples() {
        let report = REPORT.replace(
            r#""errors_outside_of_examples_count": 0"#,
            r#""errors_outside_of_examples_count": 2"#,
        );
        let result = parse(&report).expect("valid rspec json");
        assert_eq!(result.test_results.summary.other_errors, 1);
        assert!(result.test_results.other_errors[0]
            .message
            .contains("2 error(s)"));
    }

    #[test]
    fn rejects_json_that_is_not_rspec() {
        let err = parse(r#"{"tests": []}"#).expect_err("not rspec");
        assert!(matches!(err, ParseFailure::Mismatch(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse("{").expect_err("not json");
        assert!(matches!(err, ParseFailure::Invalid(_)));
    }
}
