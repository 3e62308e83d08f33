// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Environment adjustments for children driven by a queue-based runner.
//!
//! When ABQ is in play, captain owns exit-code interpretation, so the child
//! must not rewrite its own exit code. The overrides apply to the child
//! environment only, never to our own process.

use camino::Utf8Path;

pub(crate) const SET_EXIT_CODE_VAR: &str = "ABQ_SET_EXIT_CODE";
pub(crate) const STATE_FILE_VAR: &str = "ABQ_STATE_FILE";

/// Computes the ABQ overrides for the child environment. Empty when no
/// `ABQ_*` variable is present in the ambient environment.
pub(crate) fn child_overrides(
    ambient: &[(String, String)],
    state_dir: &Utf8Path,
) -> Vec<(String, String)> {
    let queue_driven = ambient.iter().any(|(name, _)| name.starts_with("ABQ_"));
    if !queue_driven {
        return Vec::new();
    }

    let mut overrides = vec![(SET_EXIT_CODE_VAR.to_owned(), "false".to_owned())];
    if !ambient.iter().any(|(name, _)| name == STATE_FILE_VAR) {
        overrides.push((
            STATE_FILE_VAR.to_owned(),
            state_dir
                .join(format!("captain-abq-state-{}.json", std::process::id()))
                .into_string(),
        ));
    }
    overrides
}
