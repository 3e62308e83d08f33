// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The JUnit XML parser.
//!
//! JUnit is the lingua franca of test reporting and routinely lies about
//! which framework produced it, so this parser always reports `Neutral`
//! sentiment and attributes results to `Other/Other`.

use super::{
    seconds_to_duration, split_backtrace,
    xml::{root_element_name, NOT_XML},
    ParseFailure, ParseResult, ParserKind, Sentiment,
};
use crate::results::{Attempt, Framework, Location, Status, Test, TestResults};
use serde::Deserialize;

const MISMATCH: &str = "The test suites in the XML do not appear to match JUnit XML";

#[derive(Debug, Deserialize)]
struct TestSuites {
    #[serde(default, rename = "testsuite")]
    test_suites: Vec<TestSuite>,
}

#[derive(Debug, Deserialize)]
struct TestSuite {
    #[serde(rename = "@tests")]
    tests: Option<u64>,
    #[serde(rename = "@file")]
    file: Option<String>,
    #[serde(default, rename = "testcase")]
    test_cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@classname")]
    classname: Option<String>,
    #[serde(rename = "@file")]
    file: Option<String>,
    #[serde(rename = "@line")]
    line: Option<u64>,
    #[serde(rename = "@time")]
    time: Option<f64>,
    #[serde(default)]
    failure: Vec<Fault>,
    #[serde(default)]
    error: Vec<Fault>,
    skipped: Option<Skipped>,
    #[serde(rename = "system-out")]
    system_out: Option<String>,
    #[serde(rename = "system-err")]
    system_err: Option<String>,
}

/// A `<failure>` or `<error>` element. The body arrives as either CDATA or
/// character data; quick-xml surfaces both through `$text`.
#[derive(Debug, Deserialize)]
struct Fault {
    #[serde(rename = "@message")]
    message: Option<String>,
    #[serde(rename = "@type")]
    exception: Option<String>,
    #[serde(rename = "$text")]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Skipped {
    #[serde(rename = "@message")]
    message: Option<String>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let root = root_element_name(input)?;
    if root != "testsuites" {
        return Err(ParseFailure::Invalid(NOT_XML.to_owned()));
    }

    let suites: TestSuites = quick_xml::de::from_str(input)
        .map_err(|err| ParseFailure::Mismatch(format!("{MISMATCH}: {err}")))?;
    if suites.test_suites.is_empty()
        || suites.test_suites.iter().any(|suite| suite.tests.is_none())
    {
        return Err(ParseFailure::Mismatch(MISMATCH.to_owned()));
    }

    let mut tests = Vec::new();
    for suite in suites.test_suites {
        for case in suite.test_cases {
            tests.push(into_test(case, suite.file.as_deref()));
        }
    }

    Ok(ParseResult {
        parser: ParserKind::JunitXml,
        sentiment: Sentiment::Neutral,
        test_results: TestResults::new(Framework::other(), tests, Vec::new()),
    })
}

fn into_test(case: TestCase, suite_file: Option<&str>) -> Test {
    let status = if let Some(fault) = case.failure.into_iter().chain(case.error).next() {
        Status::failed(
            fault.message,
            fault.exception,
            fault.body.as_deref().map(split_backtrace).unwrap_or_default(),
        )
    } else if let Some(skipped) = case.skipped {
        Status::Skipped {
            message: skipped.message,
        }
    } else {
        Status::Successful
    };

    let mut attempt = Attempt::new(status);
    attempt.duration = case.time.map(seconds_to_duration);
    attempt.stdout = case.system_out;
    attempt.stderr = case.system_err;

    let mut test = Test::new(
        reconcile_name(case.name.as_deref(), case.classname.as_deref()),
        attempt,
    );
    if let Some(file) = case.file.or_else(|| suite_file.map(str::to_owned)) {
        test.location = Some(Location::new(file, case.line));
    }
    test
}

/// JUnit's `name`/`classname` split is inconsistent across producers. If one
/// contains the other, the longer wins; otherwise the effective name is
/// `classname + " " + name`.
fn reconcile_name(name: Option<&str>, classname: Option<&str>) -> String {
    match (name, classname) {
        (Some(name), Some(classname)) => {
            if classname.contains(name) {
                classname.to_owned()
            } else if name.contains(classname) {
                name.to_owned()
            } else {
                format!("{classname} {name}")
            }
        }
        (Some(name), None) => name.to_owned(),
        (None, Some(classname)) => classname.to_owned(),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use test_case::test_case;

    #[test]
    fn errors_on_malformed_xml() {
        let err = parse("<abc").expect_err("unterminated tag");
        assert!(err.message().contains("Unable to parse test results as XML"));

        let err = parse("<foo></foo>").expect_err("wrong root element");
        assert!(err.message().contains("Unable to parse test results as XML"));
    }

    #[test]
    fn errors_on_xml_that_is_not_junit() {
        let err = parse("<testsuites></testsuites>").expect_err("no test suites");
        assert!(err
            .message()
            .contains("The test suites in the XML do not appear to match JUnit XML"));

        let err = parse("<testsuites><testsuite></testsuite></testsuites>")
            .expect_err("testsuite without a tests count");
        assert!(err
            .message()
            .contains("The test suites in the XML do not appear to match JUnit XML"));
    }

    #[test]
    fn extracts_file_and_line() {
        let result = parse(indoc! {r#"
            <testsuites>
              <testsuite tests="1">
                <testcase
                  name="some test name"
                  classname="prefix some test name"
                  file="some/path/to/file.js"
                  line="12"
                >
                </testcase>
              </testsuite>
            </testsuites>
        "#})
        .expect("valid junit");

        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.test_results.framework, Framework::other());
        assert_eq!(
            result.test_results.tests[0].location,
            Some(Location::new("some/path/to/file.js", Some(12)))
        );
    }

    #[test]
    fn parses_duration_as_seconds() {
        let result = parse(indoc! {r#"
            <testsuites>
              <testsuite tests="1">
                <testcase name="some test name" classname="x" time="1.5249"></testcase>
              </testsuite>
            </testsuites>
        "#})
        .expect("valid junit");

        assert_eq!(
            result.test_results.tests[0].attempts[0].duration,
            Some(Duration::from_nanos(1_524_900_000))
        );
    }

    #[test_case("<![CDATA[line 1\n\t\tline 2\n\n\t\tline 3]]>" ; "cdata body")]
    #[test_case("line 1\n\t\tline 2\n\n\t\tline 3" ; "character data body")]
    fn parses_failure_bodies(body: &str) {
        let input = format!(
            r#"<testsuites><testsuite tests="1">
                 <testcase name="t" classname="c t">
                   <failure type="someclass" message="some message">{body}</failure>
                 </testcase>
               </testsuite></testsuites>"#
        );
        let result = parse(&input).expect("valid junit");

        assert_eq!(
            result.test_results.tests[0].effective_status(),
            &Status::failed(
                Some("some message".to_owned()),
                Some("someclass".to_owned()),
                vec![
                    "line 1".to_owned(),
                    "line 2".to_owned(),
                    String::new(),
                    "line 3".to_owned(),
                ],
            )
        );
    }

    #[test]
    fn parses_error_elements_like_failures() {
        let result = parse(indoc! {r#"
            <testsuites>
              <testsuite tests="1">
                <testcase name="t" classname="c t">
                  <error type="someclass" message="some message">trace here</error>
                </testcase>
              </testsuite>
            </testsuites>
        "#})
        .expect("valid junit");

        assert_eq!(
            result.test_results.tests[0].effective_status(),
            &Status::failed(
                Some("some message".to_owned()),
                Some("someclass".to_owned()),
                vec!["trace here".to_owned()],
            )
        );
    }

    #[test]
    fn parses_skipped_with_message() {
        let result = parse(indoc! {r#"
            <testsuites>
              <testsuite tests="1">
                <testcase name="t" classname="c t">
                  <skipped message="some reason" />
                </testcase>
              </testsuite>
            </testsuites>
        "#})
        .expect("valid junit");

        assert_eq!(
            result.test_results.tests[0].effective_status(),
            &Status::Skipped {
                message: Some("some reason".to_owned())
            }
        );
        assert_eq!(result.test_results.summary.skipped, 1);
    }

    #[test_case("some test name", "prefix some test name", "prefix some test name" ; "classname contains name")]
    #[test_case("prefix some test name", "some test name", "prefix some test name" ; "name contains classname")]
    #[test_case("prefix some test name", "prefix some test name", "prefix some test name" ; "equal")]
    #[test_case("some test name", "prefix", "prefix some test name" ; "disjoint concatenates")]
    fn reconciles_names(name: &str, classname: &str, expected: &str) {
        assert_eq!(reconcile_name(Some(name), Some(classname)), expected);
    }

    #[test]
    fn summary_counts_match_statuses() {
        let result = parse(indoc! {r#"
            <testsuites>
              <testsuite tests="3">
                <testcase name="a" classname="c a" />
                <testcase name="b" classname="c b"><failure message="m">t</failure></testcase>
                <testcase name="d" classname="c d"><skipped /></testcase>
              </testsuite>
            </testsuites>
        "#})
        .expect("valid junit");

        let summary = &result.test_results.summary;
        assert_eq!(summary.tests, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.other_errors, 0);
    }
}
