// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and subcommand dispatch.

use crate::errors::report_error;
use camino::Utf8PathBuf;
use captain_runner::{
    api::{HttpPolicyClient, PolicyClient},
    errors::RunError,
    partition::{partition_files, PartitionConfig},
    providers::CommitMetadata,
    reporting::ReporterKind,
    retry::{MaxTestsToRetry, RetrySettings},
    runner::{RunConfig, SuiteRunner},
    signal::SignalHandlerKind,
};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// The default policy service host; override with `CAPTAIN_API_HOST`.
const DEFAULT_API_HOST: &str = "https://captain.build";

#[derive(Debug, Parser)]
#[command(
    name = "captain",
    about = "Wraps a test suite with quarantining, targeted retries, and result uploads",
    version
)]
struct CaptainApp {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a build- or test-suite
    ///
    /// Runs the given command, reconciles its result files against the
    /// suite's quarantined and flaky tests, optionally retries failing
    /// tests, and uploads the resulting artifacts.
    Run(RunOpts),

    /// Execute a test-suite and modify its exit code based on quarantined tests
    ///
    /// Unlike run, quarantine does not attempt retries or upload results.
    Quarantine(QuarantineOpts),

    /// Update a specific resource in captain
    #[command(subcommand)]
    Update(UpdateCommand),

    /// Print the test files assigned to this partition of the suite
    Partition(PartitionOpts),
}

#[derive(Debug, Subcommand)]
enum UpdateCommand {
    /// Parse test-result files and update captain's storage accordingly
    Results(UpdateResultsOpts),
}

#[derive(Debug, Args)]
struct SuiteOpts {
    /// The identifier of the test suite
    #[arg(long, value_name = "ID")]
    suite_id: String,

    /// A filepath to a test result - supports globs for multiple result files
    #[arg(long, value_name = "GLOB")]
    test_results: Option<String>,
}

#[derive(Debug, Args)]
struct OutputOpts {
    /// Print a summary of all tests to the console
    #[arg(long)]
    print_summary: bool,

    /// Disable most default output
    #[arg(long, short = 'q')]
    quiet: bool,

    /// One or more type=output_path pairs to enable different reporters
    ///
    /// Available reporter types are `rwx-v1-json` and `junit-xml`.
    #[arg(long = "reporter", value_name = "TYPE=PATH")]
    reporters: Vec<String>,
}

#[derive(Debug, Args)]
struct MetadataOpts {
    /// The git commit sha hash of the commit being built
    #[arg(long, env = "CAPTAIN_SHA")]
    sha: Option<String>,

    /// The branch name of the commit being built
    #[arg(long, env = "CAPTAIN_BRANCH")]
    branch: Option<String>,

    /// The person who triggered the build
    #[arg(long, env = "CAPTAIN_WHO")]
    who: Option<String>,

    /// The git commit message of the commit being built
    #[arg(long, env = "CAPTAIN_COMMIT_MESSAGE")]
    commit_message: Option<String>,

    /// The URL of the build results
    #[arg(long, env = "CAPTAIN_BUILD_URL")]
    build_url: Option<String>,
}

impl MetadataOpts {
    fn into_metadata(self) -> CommitMetadata {
        CommitMetadata {
            sha: self.sha,
            branch: self.branch,
            who: self.who,
            commit_message: self.commit_message,
            build_url: self.build_url,
        }
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    suite: SuiteOpts,

    /// The number of times failed tests should be retried
    ///
    /// For example, --retries 2 means a maximum of 3 attempts of any given
    /// test. -1 leaves the retry count unset.
    #[arg(long, default_value_t = -1, value_name = "N", allow_negative_numbers = true)]
    retries: i32,

    /// The number of times failing flaky tests should be retried
    ///
    /// Takes precedence over --retries when the test is known to be flaky.
    #[arg(long, default_value_t = -1, value_name = "N", allow_negative_numbers = true)]
    flaky_retries: i32,

    /// Fail the suite as soon as the overall verdict can no longer pass
    #[arg(long)]
    fail_retries_fast: bool,

    /// Skip retries when more than N tests (or P% of all tests) failed
    #[arg(long, value_name = "N|P%")]
    max_tests_to_retry: Option<MaxTestsToRetry>,

    /// The command used to run a subset of tests while retrying
    ///
    /// Required if --retries or --flaky-retries is passed. For example:
    /// --retry-command 'bundle exec rspec {{ tests }}'
    #[arg(long, value_name = "TEMPLATE")]
    retry_command: Option<String>,

    /// Commands to run immediately before captain retries a test
    #[arg(long = "pre-retry", value_name = "CMD")]
    pre_retry_commands: Vec<String>,

    /// Commands to run immediately after captain retries a test
    #[arg(long = "post-retry", value_name = "CMD")]
    post_retry_commands: Vec<String>,

    /// Store intermediate result files under this path instead of removing them
    #[arg(long, value_name = "PATH")]
    intermediate_artifacts_path: Option<Utf8PathBuf>,

    /// Return a non-zero exit code when the test results upload fails
    #[arg(long)]
    fail_on_upload_error: bool,

    /// Update captain's storage under '.captain' with the latest results
    #[arg(long)]
    update_stored_results: bool,

    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    metadata: MetadataOpts,

    /// The suite command to execute
    #[arg(last = true, required = true, value_name = "ARGS")]
    args: Vec<String>,
}

#[derive(Debug, Args)]
struct QuarantineOpts {
    #[command(flatten)]
    suite: SuiteOpts,

    /// Update captain's storage under '.captain' with the latest results
    #[arg(long)]
    update_stored_results: bool,

    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    metadata: MetadataOpts,

    /// The suite command to execute
    #[arg(last = true, required = true, value_name = "ARGS")]
    args: Vec<String>,
}

#[derive(Debug, Args)]
struct UpdateResultsOpts {
    /// The identifier of the test suite
    #[arg(long, value_name = "ID")]
    suite_id: String,

    #[command(flatten)]
    metadata: MetadataOpts,

    /// The test-result files to ingest
    #[arg(required = true, value_name = "FILES")]
    files: Vec<Utf8PathBuf>,
}

#[derive(Debug, Args)]
struct PartitionOpts {
    /// The identifier of the test suite
    #[arg(long, value_name = "ID")]
    suite_id: String,

    /// Which partition to select, counting from 0
    #[arg(long, value_name = "INDEX")]
    index: usize,

    /// The total number of partitions
    #[arg(long, value_name = "TOTAL")]
    total: usize,

    /// The test files to partition
    #[arg(required = true, value_name = "FILES")]
    files: Vec<String>,
}

pub(crate) fn main_impl() -> i32 {
    let app = CaptainApp::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("captain=warn,captain_runner=warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: unable to start the async runtime: {err}");
            return 1;
        }
    };

    match runtime.block_on(exec(app.command)) {
        Ok(exit_code) => exit_code,
        Err(err) => report_error(&err),
    }
}

async fn exec(command: Command) -> Result<i32, RunError> {
    let client: Arc<dyn PolicyClient> = Arc::new(policy_client());
    let runner = SuiteRunner::new(client.clone());
    let mut signal = SignalHandlerKind::Standard
        .build()
        .unwrap_or_else(|_| captain_runner::signal::SignalHandler::noop());

    match command {
        Command::Run(opts) => {
            let config = run_config(opts)?;
            let verdict = runner.run_suite(config, &mut signal).await?;
            Ok(verdict.exit_code)
        }
        Command::Quarantine(opts) => {
            let config = quarantine_config(opts)?;
            let verdict = runner.run_suite(config, &mut signal).await?;
            Ok(verdict.exit_code)
        }
        Command::Update(UpdateCommand::Results(opts)) => {
            runner
                .update_test_results(
                    &opts.suite_id,
                    &opts.files,
                    &opts.metadata.into_metadata(),
                )
                .await?;
            Ok(0)
        }
        Command::Partition(opts) => {
            let timings = client
                .get_test_timing_manifest(&opts.suite_id)
                .await
                .unwrap_or_else(|err| {
                    tracing::warn!("unable to fetch the timing manifest: {err}");
                    Vec::new()
                });
            let config = PartitionConfig::new(opts.index, opts.total)?;
            let selected = partition_files(&opts.files, &timings, config);
            println!("{}", selected.join(" "));
            Ok(0)
        }
    }
}

fn policy_client() -> HttpPolicyClient {
    let host =
        std::env::var("CAPTAIN_API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_owned());
    let token = std::env::var("RWX_ACCESS_TOKEN").unwrap_or_default();
    HttpPolicyClient::new(host, token)
}

fn run_config(opts: RunOpts) -> Result<RunConfig, RunError> {
    let mut config = RunConfig::new(opts.suite.suite_id, opts.args);
    config.test_results_glob = opts.suite.test_results;
    config.retries = RetrySettings {
        // -1 means "unset"; with no suite-config layer in play, unset
        // resolves to no retries. 0 explicitly means no retries.
        attempts: opts.retries.max(0) as u32,
        flaky_attempts: opts.flaky_retries.max(0) as u32,
        fail_fast: opts.fail_retries_fast,
        max_tests_to_retry: opts.max_tests_to_retry,
        command_template: opts.retry_command,
    };
    config.pre_retry_commands = opts.pre_retry_commands;
    config.post_retry_commands = opts.post_retry_commands;
    config.intermediate_artifacts_path = opts.intermediate_artifacts_path;
    config.fail_on_upload_error = opts.fail_on_upload_error;
    config.update_stored_results = opts.update_stored_results;
    config.upload_results = true;
    config.reporters = parse_reporters(&opts.output.reporters)?;
    config.quiet = opts.output.quiet;
    config.print_summary = opts.output.print_summary;
    config.metadata = opts.metadata.into_metadata();
    Ok(config)
}

fn quarantine_config(opts: QuarantineOpts) -> Result<RunConfig, RunError> {
    let mut config = RunConfig::new(opts.suite.suite_id, opts.args);
    config.test_results_glob = opts.suite.test_results;
    config.update_stored_results = opts.update_stored_results;
    config.upload_results = false;
    config.reporters = parse_reporters(&opts.output.reporters)?;
    config.quiet = opts.output.quiet;
    config.print_summary = opts.output.print_summary;
    config.metadata = opts.metadata.into_metadata();
    Ok(config)
}

fn parse_reporters(
    specs: &[String],
) -> Result<IndexMap<Utf8PathBuf, ReporterKind>, RunError> {
    let mut reporters = IndexMap::new();
    for spec in specs {
        let (name, path) = spec.split_once('=').unwrap_or((spec.as_str(), ""));
        let kind: ReporterKind = name.parse().map_err(RunError::Configuration)?;
        reporters.insert(Utf8PathBuf::from(path), kind);
    }
    Ok(reporters)
}
