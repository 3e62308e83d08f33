// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The retry planner: deciding whether to re-execute a subset of failing
//! tests, and which subset.
//!
//! Flaky and non-flaky failures carry independent budgets. Budgets are
//! tracked per test identity as two counters; a single number cannot express
//! "two more tries if flaky, none otherwise".

pub mod substitution;

use crate::{
    errors::{ConfigurationError, MaxTestsToRetryParseError},
    reconcile::{Reconciliation, TestTag},
    results::{IdentityKey, TestResults},
};
use std::{collections::HashMap, fmt, str::FromStr};

/// The retry configuration the engine resolves before the first iteration.
#[derive(Clone, Debug, Default)]
pub struct RetrySettings {
    /// Retry budget for non-flaky failing tests.
    pub attempts: u32,
    /// Independent retry budget for flaky failing tests.
    pub flaky_attempts: u32,
    pub fail_fast: bool,
    pub max_tests_to_retry: Option<MaxTestsToRetry>,
    pub command_template: Option<String>,
}

impl RetrySettings {
    pub fn retries_enabled(&self) -> bool {
        self.attempts > 0 || self.flaky_attempts > 0
    }

    /// A template is required as soon as any budget is nonzero. Surfaced
    /// before the first iteration so the user never burns a suite run on a
    /// misconfiguration.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.retries_enabled() && self.command_template.is_none() {
            return Err(ConfigurationError::MissingRetryCommand);
        }
        Ok(())
    }
}

/// Cap on how many tests a retry may target: an absolute count, or a
/// percentage of all tests in the result set. A mass failure is usually
/// systemic, not flaky.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaxTestsToRetry {
    Count(usize),
    Percentage(f64),
}

impl MaxTestsToRetry {
    /// The effective cap for a result set with `total_tests` tests. A
    /// percentage of zero tests is a cap of zero: never retry.
    pub fn cap(&self, total_tests: usize) -> usize {
        match self {
            Self::Count(count) => *count,
            Self::Percentage(percent) => (percent * total_tests as f64 / 100.0).floor() as usize,
        }
    }
}

impl FromStr for MaxTestsToRetry {
    type Err = MaxTestsToRetryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(percent) = s.strip_suffix('%') {
            let percent: f64 = percent
                .trim()
                .parse()
                .map_err(|err| MaxTestsToRetryParseError::new(s, format!("{err}")))?;
            if !percent.is_finite() || percent <= 0.0 {
                return Err(MaxTestsToRetryParseError::new(
                    s,
                    "the percentage must be greater than zero",
                ));
            }
            return Ok(Self::Percentage(percent));
        }

        match s.trim().parse::<isize>() {
            Err(err) => Err(MaxTestsToRetryParseError::new(s, format!("{err}"))),
            Ok(count) if count <= 0 => Err(MaxTestsToRetryParseError::new(
                s,
                "the count must be greater than zero",
            )),
            Ok(count) => Ok(Self::Count(count as usize)),
        }
    }
}

impl fmt::Display for MaxTestsToRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Percentage(percent) => write!(f, "{percent}%"),
        }
    }
}

/// Per-identity budget accounting across retry iterations. Two counters per
/// test, keyed by identity; owned by the run engine for the suite's lifetime.
#[derive(Clone, Debug, Default)]
pub struct RetryBudgets {
    used: HashMap<IdentityKey, BudgetUse>,
}

#[derive(Clone, Copy, Debug, Default)]
struct BudgetUse {
    non_flaky: u32,
    flaky: u32,
}

impl RetryBudgets {
    pub fn new() -> Self {
        Self::default()
    }

    fn used(&self, key: &IdentityKey, flaky: bool) -> u32 {
        let entry = self.used.get(key).copied().unwrap_or_default();
        if flaky { entry.flaky } else { entry.non_flaky }
    }

    fn remaining(&self, key: &IdentityKey, flaky: bool, settings: &RetrySettings) -> u32 {
        let budget = if flaky {
            settings.flaky_attempts
        } else {
            settings.attempts
        };
        budget.saturating_sub(self.used(key, flaky))
    }

    /// Records that a retry was scheduled for this test out of the given
    /// budget.
    pub fn record(&mut self, key: IdentityKey, flaky: bool) {
        let entry = self.used.entry(key).or_default();
        if flaky {
            entry.flaky += 1;
        } else {
            entry.non_flaky += 1;
        }
    }
}

/// The planner's decision at one iteration boundary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Terminate the loop; the engine computes the verdict from the final
    /// results.
    Stop(StopReason),
    /// Re-execute the tests at these indices of `results.tests`.
    Retry { test_indices: Vec<usize> },
}

/// Why the planner stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Nothing left failing (other than quarantined tests).
    NoFailures,
    /// Retries are not configured.
    RetriesDisabled,
    /// Every failing test has exhausted its applicable budget.
    BudgetsExhausted,
    /// Fail-fast: some failing test can no longer be retried, so the overall
    /// verdict cannot become a pass.
    FailFast,
    /// The failing subset exceeds the max-tests-to-retry cap.
    TooManyFailures,
}

/// Decides whether to retry, given the reconciled results and the budget
/// state after the most recent attempt.
pub fn plan(
    results: &TestResults,
    reconciliation: &Reconciliation,
    settings: &RetrySettings,
    budgets: &RetryBudgets,
) -> RetryDecision {
    // Quarantined failures are retried too; quarantine is a verdict
    // concern, not a retry concern.
    let candidates: Vec<(usize, bool)> = reconciliation.retry_candidates().collect();
    if candidates.is_empty() {
        return RetryDecision::Stop(StopReason::NoFailures);
    }
    if !settings.retries_enabled() {
        return RetryDecision::Stop(StopReason::RetriesDisabled);
    }

    let mut eligible = Vec::new();
    let mut exhausted_live = 0usize;
    for (index, flaky) in candidates {
        let key = results.tests[index].identity().key();
        if budgets.remaining(&key, flaky, settings) > 0 {
            eligible.push(index);
        } else if matches!(
            reconciliation.tags[index],
            TestTag::FlakyFailing | TestTag::NonFlakyFailing
        ) {
            // A quarantined test running out of budget cannot flip the
            // verdict, so it never triggers fail-fast.
            exhausted_live += 1;
        }
    }

    if settings.fail_fast && exhausted_live > 0 {
        return RetryDecision::Stop(StopReason::FailFast);
    }
    if eligible.is_empty() {
        return RetryDecision::Stop(StopReason::BudgetsExhausted);
    }

    if let Some(max) = &settings.max_tests_to_retry {
        let cap = max.cap(results.tests.len());
        if eligible.len() > cap {
            return RetryDecision::Stop(StopReason::TooManyFailures);
        }
    }

    RetryDecision::Retry {
        test_indices: eligible,
    }
}
