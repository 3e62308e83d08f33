// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering runner errors at the CLI boundary.

use captain_runner::errors::RunError;
use owo_colors::OwoColorize;

/// Prints `err` (and its cause chain) to stderr and returns the process
/// exit code. Configuration errors carry a remediation suggestion;
/// everything else prints as-is. A nonzero child exit never takes this
/// path - that is a verdict, not an error.
pub(crate) fn report_error(err: &RunError) -> i32 {
    eprintln!("{}: {err}", "error".red());

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }

    if let RunError::Configuration(configuration) = err {
        if let Some(suggestion) = configuration.suggestion() {
            eprintln!("{}", suggestion.yellow());
        }
    }

    err.exit_code()
}
