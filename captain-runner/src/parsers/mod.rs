// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsers for the test-result formats captain understands, and the registry
//! that selects the winning parse of an input file.
//!
//! Framework-targeted parsers are mutually exclusive: at most one may claim
//! an input, and a file claimed by two of them is an error rather than a
//! guess. The generic parsers (the canonical JSON schema and JUnit XML) only
//! run when no framework parser matched.

mod cucumber;
mod cypress;
mod jest;
mod junit;
mod mocha;
mod pytest;
mod rspec;
mod rwx_json;
mod xml;
mod xunit_dotnet;

use crate::{
    errors::ParserSelectionError,
    results::{Framework, FrameworkKind, Language, TestResults},
};
use std::fmt;

/// How confidently a parser recognized the input.
///
/// `Positive` means "this is exactly my format". `Neutral` means the file is
/// structurally valid for a generic schema but cannot be attributed to a
/// framework (JUnit XML is the lingua franca and frequently lies about its
/// producer). `Negative` is never produced; a parser fails instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// A successful parse: which parser won, how confident it was, and the
/// normalized results.
#[derive(Clone, Debug)]
pub struct ParseResult {
    pub parser: ParserKind,
    pub sentiment: Sentiment,
    pub test_results: TestResults,
}

/// Why a parser rejected an input.
///
/// `Invalid` is "not parseable as JSON/XML at all"; `Mismatch` is "parsed,
/// but this is not my format". Only the latter is interesting diagnostically,
/// but both surface to the registry.
#[derive(Clone, Debug)]
pub enum ParseFailure {
    Invalid(String),
    Mismatch(String),
}

impl ParseFailure {
    pub fn message(&self) -> &str {
        match self {
            Self::Invalid(message) | Self::Mismatch(message) => message,
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// The fixed set of parsers. Tagged-variant dispatch keeps the
/// mutual-exclusion table and the hint table in one place.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParserKind {
    RubyRspec,
    RubyCucumber,
    JavaScriptJest,
    JavaScriptMocha,
    JavaScriptCypress,
    PythonPytest,
    DotNetXunit,
    RwxJson,
    JunitXml,
}

impl ParserKind {
    /// Framework-targeted parsers, mutually exclusive over any input.
    pub const FRAMEWORK: &'static [ParserKind] = &[
        ParserKind::RubyRspec,
        ParserKind::RubyCucumber,
        ParserKind::JavaScriptJest,
        ParserKind::JavaScriptMocha,
        ParserKind::JavaScriptCypress,
        ParserKind::PythonPytest,
        ParserKind::DotNetXunit,
    ];

    /// Generic parsers in declared order: the canonical schema first, then
    /// JUnit as the neutral fallback.
    pub const GENERIC: &'static [ParserKind] = &[ParserKind::RwxJson, ParserKind::JunitXml];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RubyRspec => "RSpec",
            Self::RubyCucumber => "Cucumber",
            Self::JavaScriptJest => "Jest",
            Self::JavaScriptMocha => "Mocha",
            Self::JavaScriptCypress => "Cypress",
            Self::PythonPytest => "pytest",
            Self::DotNetXunit => "xUnit.NET",
            Self::RwxJson => "RWX",
            Self::JunitXml => "JUnit",
        }
    }

    pub fn parse(&self, input: &str) -> Result<ParseResult, ParseFailure> {
        match self {
            Self::RubyRspec => rspec::parse(input),
            Self::RubyCucumber => cucumber::parse(input),
            Self::JavaScriptJest => jest::parse(input),
            Self::JavaScriptMocha => mocha::parse(input),
            Self::JavaScriptCypress => cypress::parse(input),
            Self::PythonPytest => pytest::parse(input),
            Self::DotNetXunit => xunit_dotnet::parse(input),
            Self::RwxJson => rwx_json::parse(input),
            Self::JunitXml => junit::parse(input),
        }
    }

    /// The parser registered for a `(language, kind)` hint, if any.
    pub fn for_framework(framework: &Framework) -> Option<ParserKind> {
        match (&framework.language, &framework.kind) {
            (Language::Ruby, FrameworkKind::RSpec) => Some(Self::RubyRspec),
            (Language::Ruby, FrameworkKind::Cucumber) => Some(Self::RubyCucumber),
            (Language::JavaScript, FrameworkKind::Jest) => Some(Self::JavaScriptJest),
            (Language::JavaScript, FrameworkKind::Mocha) => Some(Self::JavaScriptMocha),
            (Language::JavaScript, FrameworkKind::Cypress) => Some(Self::JavaScriptCypress),
            (Language::Python, FrameworkKind::Pytest) => Some(Self::PythonPytest),
            (Language::DotNet, FrameworkKind::XUnit) => Some(Self::DotNetXunit),
            _ => None,
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Selects the winning parse of `input`.
///
/// With a framework hint, only the hinted parser runs; a failing hinted
/// parser is an error rather than a fall-through, so hint-based behavior
/// stays predictable. Without a hint, the mutually-exclusive framework
/// parsers run first; exactly zero or one may claim the input. The generic
/// parsers run last, first `Positive` winning over the first `Neutral`.
pub fn parse_best(
    input: &str,
    hint: Option<&Framework>,
) -> Result<ParseResult, ParserSelectionError> {
    if let Some(parser) = hint.and_then(ParserKind::for_framework) {
        return parser.parse(input).map_err(|failure| {
            ParserSelectionError::HintedParserFailed {
                framework: hint.expect("hint is present on this path").to_string(),
                diagnostic: failure.message().to_owned(),
            }
        });
    }

    let mut diagnostics = Vec::new();
    let mut claimed = Vec::new();
    for parser in ParserKind::FRAMEWORK {
        match parser.parse(input) {
            Ok(result) => claimed.push(result),
            Err(failure) => diagnostics.push((parser.name().to_owned(), failure.message().to_owned())),
        }
    }
    match claimed.len() {
        1 => return Ok(claimed.remove(0)),
        0 => {}
        _ => {
            return Err(ParserSelectionError::AmbiguousInput {
                claimants: claimed
                    .iter()
                    .map(|result| result.parser.name().to_owned())
                    .collect(),
            });
        }
    }

    let mut neutral = None;
    for parser in ParserKind::GENERIC {
        match parser.parse(input) {
            Ok(result) if result.sentiment == Sentiment::Positive => return Ok(result),
            Ok(result) => {
                if neutral.is_none() {
                    neutral = Some(result);
                }
            }
            Err(failure) => diagnostics.push((parser.name().to_owned(), failure.message().to_owned())),
        }
    }
    if let Some(result) = neutral {
        return Ok(result);
    }

    Err(ParserSelectionError::UnrecognizedInput { diagnostics })
}

pub(crate) use rwx_json::Document as RwxDocument;

/// Parses `input` as a JSON value, mapping syntax errors to
/// [`ParseFailure::Invalid`] so parsers can tell "not JSON" from "JSON that
/// is not my shape".
pub(crate) fn json_value(input: &str) -> Result<serde_json::Value, ParseFailure> {
    serde_json::from_str(input).map_err(|err| {
        ParseFailure::Invalid(format!("Unable to parse test results as JSON: {err}"))
    })
}

pub(crate) fn seconds_to_duration(seconds: f64) -> std::time::Duration {
    std::time::Duration::from_nanos((seconds * 1_000_000_000.0).round() as u64)
}

/// Splits a failure body into backtrace lines: newline-delimited, each line
/// trimmed of surrounding whitespace, interior blank lines preserved.
pub(crate) fn split_backtrace(body: &str) -> Vec<String> {
    body.trim()
        .split('\n')
        .map(|line| line.trim().to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn ambiguous_input_is_rejected() {
        // Satisfies both the RSpec recognizer (examples + summary_line) and
        // the Cypress recognizer (runs + totalTests).
        let input = indoc! {r#"
            {
              "examples": [],
              "summary_line": "0 examples, 0 failures",
              "summary": { "example_count": 0, "failure_count": 0, "pending_count": 0 },
              "runs": [],
              "totalTests": 0
            }
        "#};

        let err = parse_best(input, None).expect_err("two parsers claim this input");
        match err {
            ParserSelectionError::AmbiguousInput { ref claimants } => {
                assert_eq!(*claimants, vec!["RSpec".to_owned(), "Cypress".to_owned()]);
            }
            other => panic!("expected AmbiguousInput, got {other:?}"),
        }
        assert!(err.to_string().contains("AmbiguousInput"));
    }

    #[test]
    fn unrecognized_input_aggregates_diagnostics() {
        let err = parse_best("certainly not a result file", None)
            .expect_err("nothing parses free text");
        match &err {
            ParserSelectionError::UnrecognizedInput { diagnostics } => {
                let parsers: Vec<_> = diagnostics.iter().map(|(name, _)| name.as_str()).collect();
                assert!(parsers.contains(&"RSpec"));
                assert!(parsers.contains(&"JUnit"));
            }
            other => panic!("expected UnrecognizedInput, got {other:?}"),
        }
        assert!(err.to_string().contains("UnrecognizedInput"));
    }

    #[test]
    fn hinted_parser_failure_fails_fast() {
        let junit = indoc! {r#"
            <testsuites>
              <testsuite tests="1">
                <testcase name="a" classname="b" />
              </testsuite>
            </testsuites>
        "#};

        // Without a hint this input parses via JUnit.
        let result = parse_best(junit, None).expect("junit parses");
        assert_eq!(result.parser, ParserKind::JunitXml);
        assert_eq!(result.sentiment, Sentiment::Neutral);

        // Hinted as RSpec it fails fast instead of falling through.
        let err = parse_best(junit, Some(&Framework::ruby_rspec()))
            .expect_err("hinted selection must not fall through");
        assert!(matches!(
            err,
            ParserSelectionError::HintedParserFailed { .. }
        ));
    }

    #[test]
    fn backtrace_lines_are_trimmed_with_blank_lines_preserved() {
        let body = "line 1\n\t\tline 2\n\n\t\tline 3";
        assert_eq!(
            split_backtrace(body),
            vec![
                "line 1".to_owned(),
                "line 2".to_owned(),
                String::new(),
                "line 3".to_owned(),
            ]
        );
    }

    #[test]
    fn seconds_convert_at_nanosecond_precision() {
        assert_eq!(
            seconds_to_duration(1.5249),
            std::time::Duration::from_nanos(1_524_900_000)
        );
        assert_eq!(
            seconds_to_duration(0.0063709),
            std::time::Duration::from_nanos(6_370_900)
        );
    }
}
