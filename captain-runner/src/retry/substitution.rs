// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering retry-command templates.
//!
//! Each framework registers a substitution that knows its placeholder
//! vocabulary, how to format a test identity for each placeholder, and how
//! to shard the failing subset (some frameworks want one command per file,
//! others take every identifier at once). Values are injected as whole
//! arguments after `shell-words` tokenization; escaping shell metacharacters
//! inside the template is the template author's responsibility.

use crate::{
    errors::ConfigurationError,
    results::{Framework, FrameworkKind, Language, Test},
};
use indexmap::IndexMap;

/// A parsed retry-command template: the tokenized argv skeleton plus the
/// placeholder names it mentions.
#[derive(Clone, Debug)]
pub struct RetryTemplate {
    words: Vec<String>,
    placeholders: Vec<String>,
}

impl RetryTemplate {
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let words = shell_words::split(raw).map_err(|err| ConfigurationError::CommandTokenize {
            what: "the retry command",
            err,
        })?;
        let mut placeholders = Vec::new();
        for word in &words {
            for name in placeholder_names(word) {
                if !placeholders.contains(&name) {
                    placeholders.push(name);
                }
            }
        }
        Ok(Self {
            words,
            placeholders,
        })
    }

    pub fn mentions(&self, keyword: &str) -> bool {
        self.placeholders.iter().any(|name| name == keyword)
    }

    fn render_with(&self, assignments: &[(&str, String)]) -> Vec<String> {
        self.words
            .iter()
            .map(|word| {
                let mut rendered = word.clone();
                for (keyword, value) in assignments {
                    rendered = substitute(&rendered, keyword, value);
                }
                rendered
            })
            .collect()
    }
}

fn placeholder_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                names.push(after[..end].trim().to_owned());
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    names
}

fn substitute(text: &str, keyword: &str, value: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) if after[..end].trim() == keyword => {
                out.push_str(&rest[..start]);
                out.push_str(value);
                rest = &after[end + 2..];
            }
            Some(end) => {
                out.push_str(&rest[..start + 2 + end + 2]);
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// The substitution table, keyed by `(language, kind)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Substitution {
    RubyRspec,
    RubyMinitest,
    RubyCucumber,
    JavaScriptJest,
    JavaScriptMocha,
    JavaScriptCypress,
    JavaScriptPlaywright,
    PythonPytest,
    PythonUnitTest,
    GoGinkgo,
    GoTest,
    ElixirExUnit,
    PhpPhpUnit,
    DotNetXunit,
    /// `{{ tests }}` becomes a JSON array of identities. The fallback when a
    /// framework has no entry but the template speaks this vocabulary.
    GenericJson,
}

impl Substitution {
    pub fn for_framework(framework: &Framework) -> Option<Self> {
        match (&framework.language, &framework.kind) {
            (Language::Ruby, FrameworkKind::RSpec) => Some(Self::RubyRspec),
            (Language::Ruby, FrameworkKind::Minitest) => Some(Self::RubyMinitest),
            (Language::Ruby, FrameworkKind::Cucumber) => Some(Self::RubyCucumber),
            (Language::JavaScript, FrameworkKind::Jest) => Some(Self::JavaScriptJest),
            (Language::JavaScript, FrameworkKind::Mocha) => Some(Self::JavaScriptMocha),
            (Language::JavaScript, FrameworkKind::Cypress) => Some(Self::JavaScriptCypress),
            (Language::JavaScript, FrameworkKind::Playwright) => Some(Self::JavaScriptPlaywright),
            (Language::Python, FrameworkKind::Pytest) => Some(Self::PythonPytest),
            (Language::Python, FrameworkKind::UnitTest) => Some(Self::PythonUnitTest),
            (Language::Go, FrameworkKind::Ginkgo) => Some(Self::GoGinkgo),
            (Language::Go, FrameworkKind::GoTest) => Some(Self::GoTest),
            (Language::Elixir, FrameworkKind::ExUnit) => Some(Self::ElixirExUnit),
            (Language::Php, FrameworkKind::PhpUnit) => Some(Self::PhpPhpUnit),
            (Language::DotNet, FrameworkKind::XUnit) => Some(Self::DotNetXunit),
            _ => None,
        }
    }

    /// Picks the substitution for a result set: the framework's own entry,
    /// or the generic JSON fallback when the template speaks its vocabulary.
    /// The chosen entry must recognize at least one placeholder the template
    /// mentions.
    pub fn select(
        framework: &Framework,
        template: &RetryTemplate,
    ) -> Result<Self, ConfigurationError> {
        let substitution = Self::for_framework(framework).unwrap_or(Self::GenericJson);
        if substitution
            .keywords()
            .iter()
            .any(|keyword| template.mentions(keyword))
        {
            Ok(substitution)
        } else {
            Err(ConfigurationError::UnusableRetryTemplate {
                known: substitution.keywords().join(", "),
            })
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::RubyRspec
            | Self::RubyMinitest
            | Self::ElixirExUnit
            | Self::PythonPytest
            | Self::PythonUnitTest
            | Self::GenericJson => &["tests"],
            Self::RubyCucumber => &["scenarios"],
            Self::JavaScriptJest | Self::JavaScriptMocha | Self::JavaScriptPlaywright => {
                &["file", "grep"]
            }
            Self::JavaScriptCypress => &["spec"],
            Self::GoGinkgo => &["focus"],
            Self::GoTest => &["run"],
            Self::PhpPhpUnit => &["filter", "file"],
            Self::DotNetXunit => &["filter"],
        }
    }

    pub fn example(&self) -> &'static str {
        match self {
            Self::RubyRspec => "bundle exec rspec {{ tests }}",
            Self::RubyMinitest => "bundle exec rails test {{ tests }}",
            Self::RubyCucumber => "bundle exec cucumber {{ scenarios }}",
            Self::JavaScriptJest => "npx jest {{ file }} --testNamePattern '{{ grep }}'",
            Self::JavaScriptMocha => "npx mocha {{ file }} --grep '{{ grep }}'",
            Self::JavaScriptCypress => "npx cypress run --spec {{ spec }}",
            Self::JavaScriptPlaywright => "npx playwright test {{ file }} --grep '{{ grep }}'",
            Self::PythonPytest => "pytest {{ tests }}",
            Self::PythonUnitTest => "python -m unittest {{ tests }}",
            Self::GoGinkgo => "ginkgo --focus '{{ focus }}' ./...",
            Self::GoTest => "go test -run '{{ run }}' ./...",
            Self::ElixirExUnit => "mix test {{ tests }}",
            Self::PhpPhpUnit => "phpunit --filter '{{ filter }}' {{ file }}",
            Self::DotNetXunit => "dotnet test --filter '{{ filter }}'",
            Self::GenericJson => "./rerun-tests.sh '{{ tests }}'",
        }
    }

    /// Renders the template for the failing subset: a list of argv vectors,
    /// each its own subprocess and its own retry iteration.
    pub fn render(&self, template: &RetryTemplate, subset: &[&Test]) -> Vec<Vec<String>> {
        if subset.is_empty() {
            return Vec::new();
        }
        self.shards(subset)
            .into_iter()
            .map(|assignments| template.render_with(&assignments))
            .collect()
    }

    fn shards(&self, subset: &[&Test]) -> Vec<Vec<(&'static str, String)>> {
        match self {
            Self::RubyRspec => vec![vec![(
                "tests",
                join_mapped(subset, |test| single_quoted(&test.identity().to_string())),
            )]],
            Self::RubyMinitest | Self::ElixirExUnit => vec![vec![(
                "tests",
                join_mapped(subset, |test| single_quoted(&file_line(test))),
            )]],
            Self::RubyCucumber => vec![vec![(
                "scenarios",
                join_mapped(subset, |test| single_quoted(&file_line(test))),
            )]],
            Self::PythonPytest => vec![vec![(
                "tests",
                join_mapped(subset, |test| single_quoted(&test.identity().to_string())),
            )]],
            Self::PythonUnitTest => vec![vec![(
                "tests",
                join_mapped(subset, |test| test.identity().to_string()),
            )]],
            Self::JavaScriptJest | Self::JavaScriptMocha | Self::JavaScriptPlaywright => {
                by_file(subset)
                    .into_iter()
                    .map(|(file, tests)| {
                        vec![
                            ("file", file),
                            ("grep", join_with(&tests, "|", |test| test.name.clone())),
                        ]
                    })
                    .collect()
            }
            Self::JavaScriptCypress => {
                let specs: Vec<String> = by_file(subset).into_keys().collect();
                vec![vec![("spec", specs.join(","))]]
            }
            Self::GoGinkgo => vec![vec![(
                "focus",
                join_with(subset, "|", |test| test.name.clone()),
            )]],
            Self::GoTest => vec![vec![(
                "run",
                join_with(subset, "|", |test| format!("^{}$", test.name)),
            )]],
            Self::PhpPhpUnit => by_file(subset)
                .into_iter()
                .map(|(file, tests)| {
                    vec![
                        ("file", file),
                        ("filter", join_with(&tests, "|", |test| test.name.clone())),
                    ]
                })
                .collect(),
            Self::DotNetXunit => vec![vec![(
                "filter",
                join_with(subset, "|", |test| {
                    format!("FullyQualifiedName={}", test.name)
                }),
            )]],
            Self::GenericJson => {
                let identities: Vec<_> = subset.iter().map(|test| test.identity()).collect();
                vec![vec![(
                    "tests",
                    serde_json::to_string(&identities)
                        .expect("test identities always encode to JSON"),
                )]]
            }
        }
    }
}

fn single_quoted(value: &str) -> String {
    format!("'{value}'")
}

fn file_line(test: &Test) -> String {
    match &test.location {
        Some(location) => match location.line {
            Some(line) => format!("{}:{line}", location.file),
            None => location.file.clone(),
        },
        None => test.name.clone(),
    }
}

fn join_mapped(subset: &[&Test], f: impl Fn(&Test) -> String) -> String {
    subset.iter().map(|test| f(test)).collect::<Vec<_>>().join(" ")
}

fn join_with(subset: &[&Test], separator: &str, f: impl Fn(&Test) -> String) -> String {
    subset
        .iter()
        .map(|test| f(test))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Groups the subset by file in arrival order. Tests with no location fall
/// into a shard keyed by their own name so they are not silently dropped.
fn by_file<'a>(subset: &[&'a Test]) -> IndexMap<String, Vec<&'a Test>> {
    let mut groups: IndexMap<String, Vec<&Test>> = IndexMap::new();
    for test in subset {
        let key = test
            .location
            .as_ref()
            .map(|location| location.file.clone())
            .unwrap_or_else(|| test.name.clone());
        groups.entry(key).or_default().push(test);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{Attempt, Location, Status};
    use pretty_assertions::assert_eq;

    fn failing(name: &str, id: Option<&str>, file: Option<(&str, Option<u64>)>) -> Test {
        let mut test = Test::new(name, Attempt::new(Status::failed(None, None, Vec::new())));
        test.id = id.map(str::to_owned);
        test.location = file.map(|(file, line)| Location::new(file, line));
        test
    }

    #[test]
    fn rspec_substitutes_quoted_ids() {
        let template = RetryTemplate::parse(r#"echo "{{ tests }}""#).unwrap();
        let a = failing("a", Some("./x.rb[1:1]"), None);
        let b = failing("b", Some("./x.rb[1:2]"), None);

        let commands = Substitution::RubyRspec.render(&template, &[&a, &b]);
        assert_eq!(
            commands,
            vec![vec![
                "echo".to_owned(),
                "'./x.rb[1:1]' './x.rb[1:2]'".to_owned()
            ]]
        );
    }

    #[test]
    fn jest_shards_per_file() {
        let template =
            RetryTemplate::parse("npx jest {{ file }} --testNamePattern '{{ grep }}'").unwrap();
        let a = failing("suite one", None, Some(("a.test.js", None)));
        let b = failing("suite two", None, Some(("a.test.js", None)));
        let c = failing("other three", None, Some(("b.test.js", None)));

        let commands = Substitution::JavaScriptJest.render(&template, &[&a, &b, &c]);
        assert_eq!(
            commands,
            vec![
                vec![
                    "npx".to_owned(),
                    "jest".to_owned(),
                    "a.test.js".to_owned(),
                    "--testNamePattern".to_owned(),
                    "suite one|suite two".to_owned(),
                ],
                vec![
                    "npx".to_owned(),
                    "jest".to_owned(),
                    "b.test.js".to_owned(),
                    "--testNamePattern".to_owned(),
                    "other three".to_owned(),
                ],
            ]
        );
    }

    #[test]
    fn cypress_joins_specs_into_one_command() {
        let template = RetryTemplate::parse("npx cypress run --spec {{ spec }}").unwrap();
        let a = failing("a", None, Some(("cypress/e2e/x.cy.js", None)));
        let b = failing("b", None, Some(("cypress/e2e/y.cy.js", None)));

        let commands = Substitution::JavaScriptCypress.render(&template, &[&a, &b]);
        assert_eq!(
            commands,
            vec![vec![
                "npx".to_owned(),
                "cypress".to_owned(),
                "run".to_owned(),
                "--spec".to_owned(),
                "cypress/e2e/x.cy.js,cypress/e2e/y.cy.js".to_owned(),
            ]]
        );
    }

    #[test]
    fn go_test_anchors_run_patterns() {
        let template = RetryTemplate::parse("go test -run '{{ run }}' ./...").unwrap();
        let a = failing("TestAlpha", None, None);
        let b = failing("TestBeta", None, None);

        let commands = Substitution::GoTest.render(&template, &[&a, &b]);
        assert_eq!(commands[0][3], "^TestAlpha$|^TestBeta$");
    }

    #[test]
    fn xunit_builds_a_fully_qualified_filter() {
        let template = RetryTemplate::parse("dotnet test --filter '{{ filter }}'").unwrap();
        let a = failing("Tests.Widget.Builds", None, None);

        let commands = Substitution::DotNetXunit.render(&template, &[&a]);
        assert_eq!(commands[0][3], "FullyQualifiedName=Tests.Widget.Builds");
    }

    #[test]
    fn generic_json_substitutes_identities() {
        let template = RetryTemplate::parse("./rerun-tests.sh '{{ tests }}'").unwrap();
        let a = failing("a", Some("id-a"), None);

        let commands = Substitution::GenericJson.render(&template, &[&a]);
        let payload: serde_json::Value = serde_json::from_str(&commands[0][1]).unwrap();
        assert_eq!(payload[0]["id"], "id-a");
        assert_eq!(payload[0]["name"], "a");
    }

    #[test]
    fn selection_falls_back_to_generic_json() {
        let template = RetryTemplate::parse("./rerun-tests.sh '{{ tests }}'").unwrap();
        let substitution =
            Substitution::select(&Framework::other(), &template).expect("generic fallback");
        assert_eq!(substitution, Substitution::GenericJson);
    }

    #[test]
    fn selection_rejects_a_template_with_no_usable_placeholder() {
        let template = RetryTemplate::parse("make retry").unwrap();
        let err = Substitution::select(&Framework::ruby_rspec(), &template)
            .expect_err("no placeholders");
        assert!(matches!(
            err,
            ConfigurationError::UnusableRetryTemplate { .. }
        ));
    }

    #[test]
    fn unrelated_placeholders_pass_through() {
        let template = RetryTemplate::parse("run {{ tests }} {{ unknown }}").unwrap();
        let a = failing("a", Some("id-a"), None);
        let commands = Substitution::RubyRspec.render(&template, &[&a]);
        assert_eq!(commands[0], vec!["run", "'id-a'", "{{ unknown }}"]);
    }
}
