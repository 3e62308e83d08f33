// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The normalized in-memory representation of a test run.
//!
//! Every parser produces a [`TestResults`], and everything downstream of the
//! parsers (reconciliation, retry planning, reporting, uploads) operates on
//! this model. The canonical JSON schema is the serde representation of these
//! types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The language a test framework targets.
///
/// Open enumeration: unrecognized tags round-trip through [`Language::Other`].
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    Ruby,
    JavaScript,
    DotNet,
    Python,
    Go,
    Elixir,
    Php,
    Other(String),
}

impl Language {
    pub fn as_tag(&self) -> &str {
        match self {
            Self::Ruby => "Ruby",
            Self::JavaScript => "JavaScript",
            Self::DotNet => "DotNet",
            Self::Python => "Python",
            Self::Go => "Go",
            Self::Elixir => "Elixir",
            Self::Php => "PHP",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "Ruby" => Self::Ruby,
            "JavaScript" => Self::JavaScript,
            "DotNet" => Self::DotNet,
            "Python" => Self::Python,
            "Go" => Self::Go,
            "Elixir" => Self::Elixir,
            "PHP" => Self::Php,
            "Other" => Self::Other("Other".to_owned()),
            _ => Self::Other(tag),
        }
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.as_tag().to_owned()
    }
}

/// The kind of test framework within a language.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FrameworkKind {
    RSpec,
    Minitest,
    Jest,
    Mocha,
    Cypress,
    Playwright,
    Pytest,
    UnitTest,
    Ginkgo,
    GoTest,
    ExUnit,
    PhpUnit,
    Cucumber,
    XUnit,
    Other(String),
}

impl FrameworkKind {
    pub fn as_tag(&self) -> &str {
        match self {
            Self::RSpec => "RSpec",
            Self::Minitest => "minitest",
            Self::Jest => "Jest",
            Self::Mocha => "Mocha",
            Self::Cypress => "Cypress",
            Self::Playwright => "Playwright",
            Self::Pytest => "pytest",
            Self::UnitTest => "unittest",
            Self::Ginkgo => "Ginkgo",
            Self::GoTest => "go test",
            Self::ExUnit => "ExUnit",
            Self::PhpUnit => "PHPUnit",
            Self::Cucumber => "Cucumber",
            Self::XUnit => "xUnit",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for FrameworkKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "RSpec" => Self::RSpec,
            "minitest" => Self::Minitest,
            "Jest" => Self::Jest,
            "Mocha" => Self::Mocha,
            "Cypress" => Self::Cypress,
            "Playwright" => Self::Playwright,
            "pytest" => Self::Pytest,
            "unittest" => Self::UnitTest,
            "Ginkgo" => Self::Ginkgo,
            "go test" => Self::GoTest,
            "ExUnit" => Self::ExUnit,
            "PHPUnit" => Self::PhpUnit,
            "Cucumber" => Self::Cucumber,
            "xUnit" => Self::XUnit,
            "Other" => Self::Other("Other".to_owned()),
            _ => Self::Other(tag),
        }
    }
}

impl From<FrameworkKind> for String {
    fn from(kind: FrameworkKind) -> Self {
        kind.as_tag().to_owned()
    }
}

/// A `(language, kind)` pair identifying the framework that produced a result
/// set. This is the key used by the substitution table and by parser hints.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Framework {
    pub language: Language,
    pub kind: FrameworkKind,
}

impl Framework {
    pub fn new(language: Language, kind: FrameworkKind) -> Self {
        Self { language, kind }
    }

    pub fn ruby_rspec() -> Self {
        Self::new(Language::Ruby, FrameworkKind::RSpec)
    }

    pub fn ruby_minitest() -> Self {
        Self::new(Language::Ruby, FrameworkKind::Minitest)
    }

    pub fn ruby_cucumber() -> Self {
        Self::new(Language::Ruby, FrameworkKind::Cucumber)
    }

    pub fn javascript_jest() -> Self {
        Self::new(Language::JavaScript, FrameworkKind::Jest)
    }

    pub fn javascript_mocha() -> Self {
        Self::new(Language::JavaScript, FrameworkKind::Mocha)
    }

    pub fn javascript_cypress() -> Self {
        Self::new(Language::JavaScript, FrameworkKind::Cypress)
    }

    pub fn javascript_playwright() -> Self {
        Self::new(Language::JavaScript, FrameworkKind::Playwright)
    }

    pub fn dot_net_xunit() -> Self {
        Self::new(Language::DotNet, FrameworkKind::XUnit)
    }

    pub fn python_pytest() -> Self {
        Self::new(Language::Python, FrameworkKind::Pytest)
    }

    pub fn python_unittest() -> Self {
        Self::new(Language::Python, FrameworkKind::UnitTest)
    }

    pub fn go_ginkgo() -> Self {
        Self::new(Language::Go, FrameworkKind::Ginkgo)
    }

    pub fn go_test() -> Self {
        Self::new(Language::Go, FrameworkKind::GoTest)
    }

    pub fn elixir_ex_unit() -> Self {
        Self::new(Language::Elixir, FrameworkKind::ExUnit)
    }

    pub fn php_phpunit() -> Self {
        Self::new(Language::Php, FrameworkKind::PhpUnit)
    }

    pub fn other() -> Self {
        Self::new(
            Language::Other("Other".to_owned()),
            FrameworkKind::Other("Other".to_owned()),
        )
    }

    /// Returns true for the `Other/Other` placeholder produced by generic
    /// parsers that cannot attribute the input to a framework.
    pub fn is_other(&self) -> bool {
        matches!(&self.language, Language::Other(_)) && matches!(&self.kind, FrameworkKind::Other(_))
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language.as_tag(), self.kind.as_tag())
    }
}

/// A source location attached to a test or an other-error.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: Option<u64>) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// The outcome of one attempt of one test.
///
/// The promotion rule is that the *last* attempt's status determines a test's
/// effective status; see [`Test::effective_status`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Status {
    Successful,
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exception: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        backtrace: Vec<String>,
    },
    Skipped {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Pended {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TimedOut,
    Canceled,
    TodoNotDone,
}

impl Status {
    pub fn failed(
        message: Option<String>,
        exception: Option<String>,
        backtrace: Vec<String>,
    ) -> Self {
        Self::Failed {
            message,
            exception,
            backtrace,
        }
    }

    /// Whether this status counts against the suite verdict.
    pub fn is_failing(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut | Self::Canceled)
    }

    /// Whether this status is treated as passing by the reconciler. Skipped,
    /// pended, and todo tests never fail a suite.
    pub fn is_passing(&self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Skipped { .. } | Self::Pended { .. } | Self::TodoNotDone
        )
    }
}

/// A free-form scalar map carrying framework-specific breadcrumbs (assembly,
/// test type, traits). Insertion order is preserved so the canonical JSON
/// output is deterministic.
pub type Meta = IndexMap<String, serde_json::Value>;

/// One execution of a test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_nanos"
    )]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}

impl Attempt {
    pub fn new(status: Status) -> Self {
        Self {
            duration: None,
            started_at: None,
            status,
            stdout: None,
            stderr: None,
            meta: Meta::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Serialize durations as integer nanoseconds so sub-second framework timings
/// survive the round trip exactly.
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let nanos = Option::<u64>::deserialize(deserializer)?;
        Ok(nanos.map(Duration::from_nanos))
    }
}

/// A single test: an identity plus one or more attempts in temporal order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub attempts: Vec<Attempt>,
}

impl Test {
    pub fn new(name: impl Into<String>, attempt: Attempt) -> Self {
        Self {
            id: None,
            name: name.into(),
            location: None,
            attempts: vec![attempt],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// The status of the last attempt. Computed on demand so merging attempt
    /// lists across retries never leaves a stale cached status behind.
    pub fn effective_status(&self) -> &Status {
        &self
            .attempts
            .last()
            .expect("a test always has at least one attempt")
            .status
    }

    pub fn identity(&self) -> TestIdentity {
        TestIdentity {
            id: self.id.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
        }
    }
}

/// The matching key for a test: the framework-supplied ID when there is one,
/// otherwise the derived `(name, location)` composite. Matching against
/// policy entries and merging across result files are both exact.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct TestIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl TestIdentity {
    /// The collapsed key used for dedup during merges and budget accounting.
    pub fn key(&self) -> IdentityKey {
        match &self.id {
            Some(id) => IdentityKey::Id(id.clone()),
            None => IdentityKey::Composite(self.name.clone(), self.location.clone()),
        }
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "{}", self.name),
        }
    }
}

/// See [`TestIdentity::key`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum IdentityKey {
    Id(String),
    Composite(String, Option<Location>),
}

/// A failure not attached to any test: an assembly-load failure, a harness
/// crash, a malformed fixture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtherError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backtrace: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}

impl OtherError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exception: None,
            backtrace: Vec::new(),
            location: None,
            meta: Meta::new(),
        }
    }
}

/// Derived counts over a result set. Always recomputed from the tests and
/// other-errors, never accumulated by hand.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub tests: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pended: usize,
    pub todo_not_done: usize,
    pub timed_out: usize,
    pub canceled: usize,
    pub other_errors: usize,
    /// Tests that ran more than once.
    pub retries: usize,
    /// Failing tests whose identity was quarantined by policy. Zero until the
    /// reconciler has run.
    pub quarantined: usize,
}

impl Summary {
    pub fn from_contents(tests: &[Test], other_errors: &[OtherError]) -> Self {
        let mut summary = Self {
            tests: tests.len(),
            other_errors: other_errors.len(),
            ..Self::default()
        };
        for test in tests {
            match test.effective_status() {
                Status::Successful => summary.successful += 1,
                Status::Failed { .. } => summary.failed += 1,
                Status::Skipped { .. } => summary.skipped += 1,
                Status::Pended { .. } => summary.pended += 1,
                Status::TodoNotDone => summary.todo_not_done += 1,
                Status::TimedOut => summary.timed_out += 1,
                Status::Canceled => summary.canceled += 1,
            }
            if test.attempts.len() > 1 {
                summary.retries += 1;
            }
        }
        summary
    }
}

/// A normalized test run: the framework that produced it, derived summary
/// counts, the tests, and any errors not attached to a test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub framework: Framework,
    pub summary: Summary,
    pub tests: Vec<Test>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_errors: Vec<OtherError>,
}

impl TestResults {
    pub fn new(framework: Framework, tests: Vec<Test>, other_errors: Vec<OtherError>) -> Self {
        let summary = Summary::from_contents(&tests, &other_errors);
        Self {
            framework,
            summary,
            tests,
            other_errors,
        }
    }

    pub fn empty(framework: Framework) -> Self {
        Self::new(framework, Vec::new(), Vec::new())
    }

    /// Merges `other` into `self`: other-errors concatenate, and tests with a
    /// duplicate identity collapse into one test whose attempts are the
    /// concatenation in arrival order. The summary is re-derived.
    pub fn merge(&mut self, other: TestResults) {
        if self.framework.is_other() && !other.framework.is_other() {
            self.framework = other.framework;
        }
        for incoming in other.tests {
            let key = incoming.identity().key();
            match self
                .tests
                .iter_mut()
                .find(|existing| existing.identity().key() == key)
            {
                Some(existing) => existing.attempts.extend(incoming.attempts),
                None => self.tests.push(incoming),
            }
        }
        self.other_errors.extend(other.other_errors);
        self.refresh_summary();
    }

    /// Recomputes the derived summary counts, preserving the reconciler's
    /// quarantined count.
    pub fn refresh_summary(&mut self) {
        let quarantined = self.summary.quarantined;
        self.summary = Summary::from_contents(&self.tests, &self.other_errors);
        self.summary.quarantined = quarantined;
    }
}
