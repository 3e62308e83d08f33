// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporters: pure functions from a result set to a file on disk, plus the
//! console summary. Reporters never call back into the engine.

use crate::{
    errors::{ConfigurationError, InternalError},
    parsers::RwxDocument,
    results::{Status, TestResults},
};
use camino::Utf8Path;
use owo_colors::OwoColorize;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestRerun, TestSuite};
use std::{io::Write, str::FromStr};

/// The reporter formats captain can write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReporterKind {
    RwxV1Json,
    JunitXml,
}

impl FromStr for ReporterKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rwx-v1-json" => Ok(Self::RwxV1Json),
            "junit-xml" => Ok(Self::JunitXml),
            other => Err(ConfigurationError::UnknownReporter {
                name: other.to_owned(),
            }),
        }
    }
}

/// Writes `results` to `path` in the given format, creating parent
/// directories as needed.
pub fn write_report(
    kind: ReporterKind,
    path: &Utf8Path,
    results: &TestResults,
) -> Result<(), InternalError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| InternalError::Io {
            path: parent.to_owned(),
            err,
        })?;
    }
    let contents = match kind {
        ReporterKind::RwxV1Json => render_json(results)?,
        ReporterKind::JunitXml => render_junit(results)?,
    };
    std::fs::write(path, contents).map_err(|err| InternalError::Io {
        path: path.to_owned(),
        err,
    })
}

/// The canonical schema rendering; the inverse of the RWX parser.
pub fn render_json(results: &TestResults) -> Result<String, InternalError> {
    Ok(serde_json::to_string_pretty(&RwxDocument::new(
        results.clone(),
    ))?)
}

fn render_junit(results: &TestResults) -> Result<String, InternalError> {
    let mut suite = TestSuite::new(results.framework.to_string());
    for test in &results.tests {
        let (last, prior) = test
            .attempts
            .split_last()
            .expect("a test always has at least one attempt");

        let mut status = match &last.status {
            Status::Successful => TestCaseStatus::success(),
            Status::Failed {
                message,
                exception,
                backtrace,
            } => {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                if let Some(message) = message {
                    status.set_message(message.clone());
                }
                if let Some(exception) = exception {
                    status.set_type(exception.clone());
                }
                if !backtrace.is_empty() {
                    status.set_description(backtrace.join("\n"));
                }
                status
            }
            Status::TimedOut => {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
                status.set_message("test timed out");
                status
            }
            Status::Canceled => {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
                status.set_message("test was canceled");
                status
            }
            Status::Skipped { message } | Status::Pended { message } => {
                let mut status = TestCaseStatus::skipped();
                if let Some(message) = message {
                    status.set_message(message.clone());
                }
                status
            }
            Status::TodoNotDone => {
                let mut status = TestCaseStatus::skipped();
                status.set_message("todo");
                status
            }
        };

        for attempt in prior {
            if let Status::Failed {
                message, backtrace, ..
            } = &attempt.status
            {
                let mut rerun = TestRerun::new(NonSuccessKind::Failure);
                if let Some(message) = message {
                    rerun.set_message(message.clone());
                }
                if !backtrace.is_empty() {
                    rerun.set_stack_trace(backtrace.join("\n"));
                }
                if let Some(duration) = attempt.duration {
                    rerun.set_time(duration);
                }
                status.add_rerun(rerun);
            }
        }

        let mut case = TestCase::new(test.name.clone(), status);
        if let Some(location) = &test.location {
            case.set_classname(location.file.clone());
        }
        if let Some(duration) = last.duration {
            case.set_time(duration);
        }
        suite.add_test_case(case);
    }

    let mut report = Report::new("captain");
    report.add_test_suite(suite);
    Ok(report.to_string()?)
}

/// Writes the human-readable summary line(s) shown at the end of a run.
pub fn write_summary(writer: &mut impl Write, results: &TestResults) -> std::io::Result<()> {
    let summary = &results.summary;
    let mut parts = vec![format!("{} tests", summary.tests)];
    parts.push(format!("{} passed", summary.successful.green()));
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed.red()));
    }
    if summary.timed_out > 0 {
        parts.push(format!("{} timed out", summary.timed_out.red()));
    }
    if summary.canceled > 0 {
        parts.push(format!("{} canceled", summary.canceled.red()));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped.yellow()));
    }
    if summary.pended > 0 {
        parts.push(format!("{} pended", summary.pended.yellow()));
    }
    if summary.todo_not_done > 0 {
        parts.push(format!("{} todo", summary.todo_not_done.yellow()));
    }
    if summary.quarantined > 0 {
        parts.push(format!("{} quarantined", summary.quarantined.yellow()));
    }
    if summary.retries > 0 {
        parts.push(format!("{} retried", summary.retries));
    }
    if summary.other_errors > 0 {
        parts.push(format!("{} other errors", summary.other_errors.red()));
    }
    writeln!(writer, "{}", parts.join(", "))?;

    for test in &results.tests {
        if let Status::Failed { message, .. } = test.effective_status() {
            match message {
                Some(message) => writeln!(
                    writer,
                    "{} {}: {}",
                    "FAILED".red(),
                    test.name,
                    message.lines().next().unwrap_or_default()
                )?,
                None => writeln!(writer, "{} {}", "FAILED".red(), test.name)?,
            }
        }
    }
    for error in &results.other_errors {
        writeln!(writer, "{} {}", "ERROR".red(), error.message)?;
    }
    Ok(())
}
