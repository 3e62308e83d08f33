// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The policy service client: per-suite run configuration (quarantined and
//! flaky tests, timing manifests) and result uploads.
//!
//! The service is authoritative; captain never persists remote state. The
//! trait exists so the run engine can be driven against an in-memory double
//! in tests.

use crate::{
    errors::NetworkError,
    providers::CommitMetadata,
    results::{Location, TestIdentity},
};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A policy entry identifying a test: an explicit ID, a derived
/// `(name, location)` composite, or both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl PolicyIdentity {
    /// Exact matching only: the explicit IDs are equal, or the derived
    /// composite lines up field for field. No fuzzy matching.
    pub fn matches(&self, test: &TestIdentity) -> bool {
        if let (Some(entry_id), Some(test_id)) = (&self.id, &test.id) {
            if entry_id == test_id {
                return true;
            }
        }
        match &self.name {
            Some(name) if *name == test.name => match &self.location {
                None => true,
                Some(location) => test.location.as_ref() == Some(location),
            },
            _ => false,
        }
    }
}

/// Per-suite run configuration fetched from the policy service.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RunConfiguration {
    #[serde(default)]
    pub quarantined_tests: Vec<PolicyIdentity>,
    #[serde(default)]
    pub flaky_tests: Vec<PolicyIdentity>,
}

/// One entry of the timing manifest used for file partitioning.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TestFileTiming {
    pub file: String,
    pub duration_ns: u64,
}

/// A result file queued for upload: the on-disk path it came from plus its
/// raw contents.
#[derive(Clone, Debug, Serialize)]
pub struct TestResultsFile {
    pub original_path: Utf8PathBuf,
    pub contents: String,
}

/// The upstream's receipt for one uploaded file.
#[derive(Clone, Debug, Deserialize)]
pub struct UploadResult {
    pub original_path: Utf8PathBuf,
    pub uploaded: bool,
}

/// The interface the run engine sees.
#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn get_run_configuration(
        &self,
        suite_id: &str,
    ) -> Result<RunConfiguration, NetworkError>;

    async fn get_test_timing_manifest(
        &self,
        suite_id: &str,
    ) -> Result<Vec<TestFileTiming>, NetworkError>;

    async fn upload_test_results(
        &self,
        suite_id: &str,
        metadata: &CommitMetadata,
        files: Vec<TestResultsFile>,
    ) -> Result<Vec<UploadResult>, NetworkError>;
}

/// The production client.
#[derive(Debug)]
pub struct HttpPolicyClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpPolicyClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        suite_id: &str,
    ) -> Result<T, NetworkError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .query(&[("suite_id", suite_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetworkError::UnexpectedStatus {
                operation,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    suite_id: &'a str,
    metadata: &'a CommitMetadata,
    files: Vec<TestResultsFile>,
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn get_run_configuration(
        &self,
        suite_id: &str,
    ) -> Result<RunConfiguration, NetworkError> {
        self.get_json("GetRunConfiguration", "api/run_configuration", suite_id)
            .await
    }

    async fn get_test_timing_manifest(
        &self,
        suite_id: &str,
    ) -> Result<Vec<TestFileTiming>, NetworkError> {
        self.get_json("GetTestTimingManifest", "api/test_timing_manifest", suite_id)
            .await
    }

    async fn upload_test_results(
        &self,
        suite_id: &str,
        metadata: &CommitMetadata,
        files: Vec<TestResultsFile>,
    ) -> Result<Vec<UploadResult>, NetworkError> {
        let response = self
            .client
            .post(self.url("api/test_results"))
            .bearer_auth(&self.token)
            .json(&UploadRequest {
                suite_id,
                metadata,
                files,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetworkError::UnexpectedStatus {
                operation: "UploadTestResults",
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}
