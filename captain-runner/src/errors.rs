// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the captain runner.
//!
//! The taxonomy matters at the CLI boundary: configuration errors keep usage
//! help visible, everything else suppresses it, and upload errors are only
//! fatal when the run is configured that way. A nonzero child exit is *never*
//! an error; it is an ingredient of the verdict.

use camino::Utf8PathBuf;
use thiserror::Error;

/// A problem with how the run was configured, surfaced to the user with a
/// remediation hint.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("a retry command is required when retries are enabled")]
    MissingRetryCommand,

    #[error("unknown reporter \"{name}\"")]
    UnknownReporter { name: String },

    #[error(transparent)]
    MaxTestsToRetry(#[from] MaxTestsToRetryParseError),

    #[error("the retry command template does not mention any placeholder {known} understands")]
    UnusableRetryTemplate { known: String },

    #[error("unable to tokenize {what}: {err}")]
    CommandTokenize {
        what: &'static str,
        #[source]
        err: shell_words::ParseError,
    },

    #[error("partition index {index} is out of range for {total} total partitions")]
    InvalidPartition { index: usize, total: usize },
}

impl ConfigurationError {
    /// A one-line remediation suggestion shown below the error message.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::MissingRetryCommand => Some(
                "Pass --retry-command with a template such as 'bundle exec rspec {{ tests }}'."
                    .to_owned(),
            ),
            Self::UnknownReporter { .. } => {
                Some("Available reporters are 'rwx-v1-json' and 'junit-xml'.".to_owned())
            }
            Self::MaxTestsToRetry(_) => Some(
                "Pass an absolute count such as --max-tests-to-retry 15 or a percentage such as \
                 --max-tests-to-retry 1.5%."
                    .to_owned(),
            ),
            Self::InvalidPartition { .. } => {
                Some("The index counts from 0 and must be below the total.".to_owned())
            }
            Self::UnusableRetryTemplate { .. } | Self::CommandTokenize { .. } => None,
        }
    }
}

/// Error returned while parsing a `--max-tests-to-retry` value.
#[derive(Clone, Debug, Error)]
#[error("unable to parse max-tests-to-retry \"{input}\": {message}")]
pub struct MaxTestsToRetryParseError {
    pub input: String,
    pub message: String,
}

impl MaxTestsToRetryParseError {
    pub fn new(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// The caller handed us input we cannot work with: a missing result file, or
/// a result file no parser recognizes.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("unable to read test results at {path}: {err}")]
    UnreadableResults {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error(transparent)]
    ParserSelection(#[from] ParserSelectionError),
}

/// Errors from the parser registry's selection algorithm.
#[derive(Debug, Error)]
pub enum ParserSelectionError {
    /// More than one mutually-exclusive framework parser claimed the input.
    #[error("AmbiguousInput: multiple parsers claim these results: {}", claimants.join(", "))]
    AmbiguousInput { claimants: Vec<String> },

    /// Every parser rejected the input.
    #[error("UnrecognizedInput: no parser understands these results\n{}", format_diagnostics(diagnostics))]
    UnrecognizedInput { diagnostics: Vec<(String, String)> },

    /// A framework hint was provided but the hinted parser failed. Hinted
    /// selection fails fast instead of falling through.
    #[error("results hinted as {framework} could not be parsed by its parser: {diagnostic}")]
    HintedParserFailed {
        framework: String,
        diagnostic: String,
    },
}

fn format_diagnostics(diagnostics: &[(String, String)]) -> String {
    diagnostics
        .iter()
        .map(|(parser, diagnostic)| format!("  {parser}: {diagnostic}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The subprocess could not be launched at all. Distinct from the child
/// exiting nonzero, which is a verdict rather than an error.
#[derive(Debug, Error)]
#[error("unable to launch {command}: {err}")]
pub struct SystemError {
    pub command: String,
    #[source]
    pub err: std::io::Error,
}

/// Transport failures talking to the policy service.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request to the policy service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("the policy service responded with {status} for {operation}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
    },
}

/// One or more result files failed to upload. Fatal iff the run sets
/// `fail_on_upload_error`.
#[derive(Debug, Error)]
#[error("{failed} of {total} test result files failed to upload")]
pub struct UploadError {
    pub failed: usize,
    pub total: usize,
}

/// I/O or serialization failures in captain's own machinery.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("i/o failure on {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("unable to encode test results: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unable to write JUnit report: {0}")]
    Junit(#[from] quick_junit::SerializeError),

    #[error("result file glob {glob} is malformed: {err}")]
    Glob {
        glob: String,
        #[source]
        err: glob::PatternError,
    },
}

/// The top-level error for one engine invocation.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error("pre-retry command {command} exited with code {exit_code}")]
    PreRetryHookFailed { command: String, exit_code: i32 },

    #[error("post-retry command {command} exited with code {exit_code}")]
    PostRetryHookFailed { command: String, exit_code: i32 },
}

impl RunError {
    /// Configuration errors keep usage help on screen; everything else
    /// silences it.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// The process exit code for this error. Hook failures propagate the
    /// hook's own exit code; everything else is the conventional 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PreRetryHookFailed { exit_code, .. }
            | Self::PostRetryHookFailed { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }
}
