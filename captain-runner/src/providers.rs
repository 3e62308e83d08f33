// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VCS / CI metadata attached to uploads.
//!
//! Supported CI providers export this automatically; everyone else sets the
//! `CAPTAIN_*` environment variables or the equivalent CLI flags.

use serde::Serialize;

pub const SHA_VAR: &str = "CAPTAIN_SHA";
pub const BRANCH_VAR: &str = "CAPTAIN_BRANCH";
pub const WHO_VAR: &str = "CAPTAIN_WHO";
pub const COMMIT_MESSAGE_VAR: &str = "CAPTAIN_COMMIT_MESSAGE";
pub const BUILD_URL_VAR: &str = "CAPTAIN_BUILD_URL";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CommitMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
}

impl CommitMetadata {
    /// Reads the `CAPTAIN_*` variables from the ambient environment.
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|value| !value.is_empty())
        }
        Self {
            sha: var(SHA_VAR),
            branch: var(BRANCH_VAR),
            who: var(WHO_VAR),
            commit_message: var(COMMIT_MESSAGE_VAR),
            build_url: var(BUILD_URL_VAR),
        }
    }
}
