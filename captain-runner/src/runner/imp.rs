// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run engine: spawn, wait, collect, reconcile, plan, maybe retry.

use super::{abq, child};
use crate::{
    api::{PolicyClient, TestResultsFile},
    errors::{InputError, InternalError, RunError},
    parsers,
    providers::CommitMetadata,
    reconcile::{reconcile, PolicySnapshot, Reconciliation, TestTag},
    reporting::{self, ReporterKind},
    results::{Framework, OtherError, TestResults},
    retry::{
        plan,
        substitution::{RetryTemplate, Substitution},
        RetryBudgets, RetryDecision, RetrySettings,
    },
    signal::SignalHandler,
    storage::SuiteStorage,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, error, warn};

/// Everything the engine needs for one suite invocation. Validated by the
/// CLI layer; the engine only sees resolved values.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// The user-supplied suite command.
    pub args: Vec<String>,
    pub suite_id: String,
    pub test_results_glob: Option<String>,
    pub retries: RetrySettings,
    pub pre_retry_commands: Vec<String>,
    pub post_retry_commands: Vec<String>,
    pub intermediate_artifacts_path: Option<Utf8PathBuf>,
    pub update_stored_results: bool,
    pub upload_results: bool,
    pub fail_on_upload_error: bool,
    pub reporters: IndexMap<Utf8PathBuf, ReporterKind>,
    pub quiet: bool,
    pub print_summary: bool,
    pub metadata: CommitMetadata,
}

impl RunConfig {
    pub fn new(suite_id: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            args,
            suite_id: suite_id.into(),
            test_results_glob: None,
            retries: RetrySettings::default(),
            pre_retry_commands: Vec::new(),
            post_retry_commands: Vec::new(),
            intermediate_artifacts_path: None,
            update_stored_results: false,
            upload_results: true,
            fail_on_upload_error: false,
            reporters: IndexMap::new(),
            quiet: false,
            print_summary: false,
            metadata: CommitMetadata::default(),
        }
    }
}

/// The outcome of a suite run: the exit code the CLI should return and the
/// merged results across all iterations.
#[derive(Clone, Debug)]
pub struct RunVerdict {
    pub exit_code: i32,
    pub results: TestResults,
}

/// Drives suites end to end against one policy client.
pub struct SuiteRunner {
    client: Arc<dyn PolicyClient>,
    storage: SuiteStorage,
}

impl SuiteRunner {
    pub fn new(client: Arc<dyn PolicyClient>) -> Self {
        Self {
            client,
            storage: SuiteStorage::in_working_directory(),
        }
    }

    pub fn with_storage(client: Arc<dyn PolicyClient>, storage: SuiteStorage) -> Self {
        Self { client, storage }
    }

    /// Runs the suite command, reconciles the results against policy, retries
    /// per configuration, and computes the final verdict.
    pub async fn run_suite(
        &self,
        config: RunConfig,
        signal: &mut SignalHandler,
    ) -> Result<RunVerdict, RunError> {
        config.retries.validate()?;
        let template = match &config.retries.command_template {
            Some(raw) => Some(RetryTemplate::parse(raw)?),
            None => None,
        };

        // Fetched once; retry iterations must never see a different policy.
        let policy = PolicySnapshot::new(
            self.client
                .get_run_configuration(&config.suite_id)
                .await?,
        );

        let abq_overrides = abq_env_overrides();

        let mut merged = TestResults::empty(Framework::other());
        let mut collected: Vec<TestResultsFile> = Vec::new();
        let mut budgets = RetryBudgets::new();
        let mut pending: VecDeque<Vec<String>> = VecDeque::from([config.args.clone()]);
        let mut iteration: usize = 0;
        let mut last_nonzero_exit: i32 = 0;

        while let Some(argv) = pending.pop_front() {
            let is_retry = iteration > 0;

            if is_retry {
                for command in &config.pre_retry_commands {
                    run_hook(command, "a pre-retry command", true, signal).await?;
                }
            }

            // The glob is exclusively the child's while it runs; stale files
            // are cleared up front so the child starts from a blank exchange.
            if config.update_stored_results || is_retry {
                clear_result_files(config.test_results_glob.as_deref())?;
            }

            let exit_code = child::run_command(&argv, &abq_overrides, signal).await?;
            debug!(exit_code, iteration, "suite command finished");
            if exit_code != 0 {
                last_nonzero_exit = exit_code;
            }

            if is_retry {
                for command in &config.post_retry_commands {
                    run_hook(command, "a post-retry command", false, signal).await?;
                }
            }

            let files = resolve_result_files(config.test_results_glob.as_deref())?;
            if files.is_empty() {
                if exit_code != 0 {
                    merged.merge(harness_crash_results(
                        exit_code,
                        config.test_results_glob.as_deref(),
                    ));
                }
            } else {
                let (results, raw_files) = parse_result_files(&files).await?;
                archive_artifacts(
                    config.intermediate_artifacts_path.as_deref(),
                    iteration,
                    &files,
                )?;
                collected.extend(raw_files);
                merged.merge(results);
            }

            iteration += 1;
            if !pending.is_empty() {
                continue;
            }

            let reconciliation = reconcile(&merged, &policy);
            match plan(&merged, &reconciliation, &config.retries, &budgets) {
                RetryDecision::Stop(reason) => {
                    debug!(?reason, "retry loop finished");
                    break;
                }
                RetryDecision::Retry { test_indices } => {
                    let template = template
                        .as_ref()
                        .expect("the planner only retries when a template is configured");
                    let substitution = Substitution::select(&merged.framework, template)?;

                    for &index in &test_indices {
                        let flaky = matches!(
                            reconciliation.tags[index],
                            TestTag::FlakyFailing | TestTag::Quarantined { flaky: true }
                        );
                        budgets.record(merged.tests[index].identity().key(), flaky);
                    }

                    let subset: Vec<_> =
                        test_indices.iter().map(|&index| &merged.tests[index]).collect();
                    for command in substitution.render(template, &subset) {
                        pending.push_back(command);
                    }
                    if pending.is_empty() {
                        break;
                    }
                }
            }
        }

        let reconciliation = reconcile(&merged, &policy);
        merged.refresh_summary();
        merged.summary.quarantined = reconciliation.quarantined();

        let mut exit_code = verdict_exit_code(&reconciliation, last_nonzero_exit);

        if config.upload_results && !collected.is_empty() {
            if let Some(upload_failure) = self
                .upload(&config.suite_id, &config.metadata, collected)
                .await
            {
                if config.fail_on_upload_error {
                    error!("{upload_failure}");
                    if exit_code == 0 {
                        exit_code = 1;
                    }
                } else {
                    warn!("{upload_failure}");
                }
            }
        }

        if config.update_stored_results {
            self.storage.store(&config.suite_id, &merged)?;
        }

        for (path, kind) in &config.reporters {
            reporting::write_report(*kind, path, &merged)?;
        }

        if config.print_summary && !config.quiet {
            let stdout = std::io::stdout();
            let _ = reporting::write_summary(&mut stdout.lock(), &merged);
        }

        if exit_code != 0 {
            error!("test suite exited with non-zero exit code");
        }

        Ok(RunVerdict {
            exit_code,
            results: merged,
        })
    }

    /// `captain update results`: normalize result files and upload them
    /// without executing anything.
    pub async fn update_test_results(
        &self,
        suite_id: &str,
        files: &[Utf8PathBuf],
        metadata: &CommitMetadata,
    ) -> Result<TestResults, RunError> {
        let (results, raw_files) = parse_result_files(files).await?;

        if let Some(upload_failure) = self.upload(suite_id, metadata, raw_files).await {
            error!("{upload_failure}");
            return Err(crate::errors::UploadError {
                failed: 1,
                total: 1,
            }
            .into());
        }

        self.storage.store(suite_id, &results)?;
        Ok(results)
    }

    /// Returns a displayable failure when the upload did not fully succeed.
    async fn upload(
        &self,
        suite_id: &str,
        metadata: &CommitMetadata,
        files: Vec<TestResultsFile>,
    ) -> Option<String> {
        let total = files.len();
        match self
            .client
            .upload_test_results(suite_id, metadata, files)
            .await
        {
            Ok(receipts) => {
                let failed = receipts.iter().filter(|receipt| !receipt.uploaded).count();
                (failed > 0)
                    .then(|| crate::errors::UploadError { failed, total }.to_string())
            }
            Err(err) => Some(format!("unable to upload test results: {err}")),
        }
    }
}

fn verdict_exit_code(reconciliation: &Reconciliation, last_nonzero_exit: i32) -> i32 {
    if reconciliation.is_clean() {
        0
    } else if last_nonzero_exit != 0 {
        last_nonzero_exit
    } else {
        // The child claimed success but the parsed results disagree.
        1
    }
}

async fn run_hook(
    command: &str,
    what: &'static str,
    pre: bool,
    signal: &mut SignalHandler,
) -> Result<(), RunError> {
    let argv = shell_words::split(command).map_err(|err| {
        crate::errors::ConfigurationError::CommandTokenize { what, err }
    })?;
    if argv.is_empty() {
        return Ok(());
    }
    let exit_code = child::run_command(&argv, &[], signal).await?;
    if exit_code != 0 {
        return Err(if pre {
            RunError::PreRetryHookFailed {
                command: command.to_owned(),
                exit_code,
            }
        } else {
            RunError::PostRetryHookFailed {
                command: command.to_owned(),
                exit_code,
            }
        });
    }
    Ok(())
}

fn abq_env_overrides() -> Vec<(String, String)> {
    let ambient: Vec<(String, String)> = std::env::vars().collect();
    let temp_dir = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    abq::child_overrides(&ambient, &temp_dir)
}

fn resolve_result_files(pattern: Option<&str>) -> Result<Vec<Utf8PathBuf>, InternalError> {
    let Some(pattern) = pattern else {
        return Ok(Vec::new());
    };
    let paths = glob::glob(pattern).map_err(|err| InternalError::Glob {
        glob: pattern.to_owned(),
        err,
    })?;
    let mut files: Vec<Utf8PathBuf> = paths
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
        .collect();
    files.sort();
    Ok(files)
}

fn clear_result_files(pattern: Option<&str>) -> Result<(), InternalError> {
    for file in resolve_result_files(pattern)? {
        debug!(%file, "clearing stale result file");
        std::fs::remove_file(&file).map_err(|err| InternalError::Io { path: file, err })?;
    }
    Ok(())
}

/// Parses every result file concurrently and merges in filename order.
async fn parse_result_files(
    files: &[Utf8PathBuf],
) -> Result<(TestResults, Vec<TestResultsFile>), RunError> {
    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let path = path.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let contents = std::fs::read_to_string(&path).map_err(|err| {
                InputError::UnreadableResults {
                    path: path.clone(),
                    err,
                }
            })?;
            let parsed = parsers::parse_best(&contents, None)
                .map_err(InputError::ParserSelection)?;
            Ok::<_, InputError>((path, contents, parsed.test_results))
        }));
    }

    let mut merged = TestResults::empty(Framework::other());
    let mut raw_files = Vec::new();
    for handle in futures::future::join_all(handles).await {
        let (path, contents, results) =
            handle.expect("result parsing tasks are never cancelled")?;
        raw_files.push(TestResultsFile {
            original_path: path,
            contents,
        });
        merged.merge(results);
    }
    Ok((merged, raw_files))
}

fn harness_crash_results(exit_code: i32, pattern: Option<&str>) -> TestResults {
    let message = match pattern {
        Some(pattern) => format!(
            "the test suite exited with code {exit_code} without writing any result files \
             matching `{pattern}`"
        ),
        None => format!("the test suite exited with code {exit_code}"),
    };
    TestResults::new(Framework::other(), Vec::new(), vec![OtherError::new(message)])
}

fn archive_artifacts(
    destination: Option<&Utf8Path>,
    iteration: usize,
    files: &[Utf8PathBuf],
) -> Result<(), InternalError> {
    let Some(destination) = destination else {
        return Ok(());
    };
    let dir = destination.join(iteration.to_string());
    std::fs::create_dir_all(&dir).map_err(|err| InternalError::Io {
        path: dir.clone(),
        err,
    })?;
    for file in files {
        let target = dir.join(file.file_name().unwrap_or("results"));
        std::fs::copy(file, &target).map_err(|err| InternalError::Io { path: target, err })?;
    }
    Ok(())
}
