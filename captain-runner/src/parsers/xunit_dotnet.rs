// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The xUnit.NET v2 XML parser.

use super::{
    seconds_to_duration, split_backtrace,
    xml::{root_element_name, NOT_XML},
    ParseFailure, ParseResult, ParserKind, Sentiment,
};
use crate::results::{Attempt, Framework, Location, Status, Test, TestResults};
use serde::Deserialize;

const MISMATCH: &str = "The test suites in the XML do not appear to match xUnit.NET XML";

#[derive(Debug, Deserialize)]
struct Assemblies {
    #[serde(default, rename = "assembly")]
    assemblies: Vec<Assembly>,
}

#[derive(Debug, Deserialize)]
struct Assembly {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(default, rename = "collection")]
    collections: Vec<Collection>,
    #[serde(default, rename = "errors")]
    errors: Vec<Errors>,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default, rename = "test")]
    tests: Vec<TestElement>,
}

#[derive(Debug, Deserialize)]
struct Errors {
    #[serde(default, rename = "error")]
    errors: Vec<ErrorElement>,
}

#[derive(Debug, Deserialize)]
struct ErrorElement {
    #[serde(rename = "@type")]
    error_type: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    failure: Option<Failure>,
}

#[derive(Debug, Deserialize)]
struct TestElement {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@type")]
    test_type: Option<String>,
    #[serde(rename = "@method")]
    method: Option<String>,
    #[serde(rename = "@time")]
    time: Option<f64>,
    #[serde(rename = "@result")]
    result: Option<String>,
    #[serde(rename = "@source-file")]
    source_file: Option<String>,
    #[serde(rename = "@source-line")]
    source_line: Option<u64>,
    traits: Option<Traits>,
    output: Option<String>,
    failure: Option<Failure>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Traits {
    #[serde(default, rename = "trait")]
    traits: Vec<Trait>,
}

#[derive(Debug, Deserialize)]
struct Trait {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Failure {
    #[serde(rename = "@exception-type")]
    exception_type: Option<String>,
    message: Option<String>,
    #[serde(rename = "stack-trace")]
    stack_trace: Option<String>,
}

pub(super) fn parse(input: &str) -> Result<ParseResult, ParseFailure> {
    let root = root_element_name(input)?;
    if root != "assemblies" {
        return Err(ParseFailure::Invalid(NOT_XML.to_owned()));
    }

    let assemblies: Assemblies = quick_xml::de::from_str(input)
        .map_err(|err| ParseFailure::Mismatch(format!("{MISMATCH}: {err}")))?;
    if assemblies.assemblies.is_empty()
        || assemblies.assemblies.iter().any(|assembly| assembly.name.is_none())
    {
        return Err(ParseFailure::Mismatch(MISMATCH.to_owned()));
    }

    let mut tests = Vec::new();
    let mut other_errors = Vec::new();
    for assembly in assemblies.assemblies {
        let assembly_name = assembly
            .name
            .as_deref()
            .map(assembly_basename)
            .expect("assembly names were validated above");

        for errors in assembly.errors {
            for error in errors.errors {
                other_errors.push(into_other_error(error, &assembly_name));
            }
        }
        for collection in assembly.collections {
            for test in collection.tests {
                tests.push(into_test(test, &assembly_name)?);
            }
        }
    }

    Ok(ParseResult {
        parser: ParserKind::DotNetXunit,
        sentiment: Sentiment::Positive,
        test_results: TestResults::new(Framework::dot_net_xunit(), tests, other_errors),
    })
}

fn into_test(element: TestElement, assembly: &str) -> Result<Test, ParseFailure> {
    let status = match element.result.as_deref() {
        Some("Pass") => Status::Successful,
        Some("Fail") => {
            let failure = element.failure.as_ref();
            Status::failed(
                failure.and_then(|f| f.message.clone()),
                failure.and_then(|f| f.exception_type.clone()),
                failure
                    .and_then(|f| f.stack_trace.as_deref())
                    .map(split_backtrace)
                    .unwrap_or_default(),
            )
        }
        Some("Skip") => Status::Skipped {
            message: element.reason.clone(),
        },
        Some("NotRun") => Status::Skipped { message: None },
        Some(other) => {
            return Err(ParseFailure::Mismatch(format!("Unexpected result \"{other}\"")));
        }
        None => {
            return Err(ParseFailure::Mismatch(MISMATCH.to_owned()));
        }
    };

    let mut attempt = Attempt::new(status);
    attempt.duration = element.time.map(seconds_to_duration);
    attempt.stdout = element.output;
    attempt.meta.insert("assembly".to_owned(), assembly.into());
    if let Some(test_type) = element.test_type {
        attempt.meta.insert("type".to_owned(), test_type.into());
    }
    if let Some(method) = element.method {
        attempt.meta.insert("method".to_owned(), method.into());
    }
    for t in element.traits.map(|traits| traits.traits).unwrap_or_default() {
        attempt.meta.insert(format!("trait-{}", t.name), t.value.into());
    }

    let mut test = Test::new(element.name.unwrap_or_default(), attempt);
    test.id = element.id;
    if let Some(file) = element.source_file {
        test.location = Some(Location::new(file, element.source_line));
    }
    Ok(test)
}

fn into_other_error(element: ErrorElement, assembly: &str) -> crate::results::OtherError {
    let failure = element.failure.as_ref();
    let message = failure
        .and_then(|f| f.message.clone())
        .or(element.name)
        .unwrap_or_else(|| "unknown xUnit.NET error".to_owned());

    let mut error = crate::results::OtherError::new(message);
    error.exception = failure.and_then(|f| f.exception_type.clone());
    error.backtrace = failure
        .and_then(|f| f.stack_trace.as_deref())
        .map(split_backtrace)
        .unwrap_or_default();
    error.meta.insert("assembly".to_owned(), assembly.into());
    if let Some(error_type) = element.error_type {
        error.meta.insert("type".to_owned(), error_type.into());
    }
    error
}

/// The `assembly` meta field is the basename of the assembly path, never the
/// full path.
fn assembly_basename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_owned()
}
