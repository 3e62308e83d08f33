// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pytest parser (`pytest --json-report`, the pytest-json-report plugin).

use super::{json_value, seconds_to_duration, split_backtrace, ParseFailure, ParseResult, ParserKind, Sentiment};
use crate::results::{Attempt, Framework, Location, Status, Test, TestResults};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PytestReport {
    tests: Vec<PytestTest>,
}

#[derive(Debug, Deserialize)]
struct PytestTest {
    nodeid: String,
    lineno: Option<u64>,
    outcome: String,
    setup: Option<Stage>,
    call: Option<Stage>,
    teardown: Option<Stage>,
}

#[derive(Debug, Deserialize)]
struct Stage {
    duration: Option<f64>,
    crash: Option<Crash>,
    longrepr: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Crash {
    message: Option<String>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let value = json_value(input)?;
    let looks_like_pytest = value.get("tests").is_some_and(|v| v.is_array())
        && value.get("root").is_some()
        && value.get("exitcode").is_some();
    if !looks_like_pytest {
        return Err(ParseFailure::Mismatch(
            "The JSON does not look like a pytest report".to_owned(),
        ));
    }

    let report: PytestReport = serde_json::from_value(value).map_err(|err| {
        ParseFailure::Mismatch(format!("The JSON does not look like a pytest report: {err}"))
    })?;

    let tests = report
        .tests
        .into_iter()
        .map(into_test)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParseResult {
        parser: ParserKind::PythonPytest,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::python_pytest(), tests, Vec::new()),
    })
}

fn into_test(pytest: PytestTest) -> Result<Test, ParseFailure> {
    // The failing stage carries the crash details; setup errors surface the
    // same way as call failures.
    let failing_stage = [&pytest.call, &pytest.setup, &pytest.teardown]
        .into_iter()
        .flatten()
        .find(|stage| stage.crash.is_some() || stage.longrepr.is_some());

    let status = match pytest.outcome.as_str() {
        "passed" | "xpassed" => Status::Successful,
        "failed" | "error" => Status::failed(
            failing_stage
                .and_then(|stage| stage.crash.as_ref())
                .and_then(|crash| crash.message.clone()),
            None,
            failing_stage
                .and_then(|stage| stage.longrepr.as_deref())
                .map(split_backtrace)
                .unwrap_or_default(),
        ),
        "skipped" => Status::Skipped { message: None },
        "xfailed" => Status::Skipped {
            message: Some("expected failure".to_owned()),
        },
        other => {
            return Err(ParseFailure::Mismatch(format!(
                "Unexpected pytest outcome \"{other}\""
            )));
        }
    };

    let mut attempt = Attempt::new(status);
    let total_seconds: f64 = [&pytest.setup, &pytest.call, &pytest.teardown]
        .into_iter()
        .flatten()
        .filter_map(|stage| stage.duration)
        .sum();
    if total_seconds > 0.0 {
        attempt.duration = Some(seconds_to_duration(total_seconds));
    }
    if let Some(call) = &pytest.call {
        attempt.stdout = call.stdout.clone();
        attempt.stderr = call.stderr.clone();
    }

    let file = pytest.nodeid.split("::").next().unwrap_or(&pytest.nodeid).to_owned();
    let mut test = Test::new(pytest.nodeid.clone(), attempt);
    test.id = Some(pytest.nodeid);
    test.location = Some(Location::new(file, pytest.lineno));
    Ok(test)
}
