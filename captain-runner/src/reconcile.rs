// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifying a result set against the policy snapshot.
//!
//! Reconciliation is pure and idempotent: given the same results and the
//! same snapshot, it always produces the same tags. The snapshot is fetched
//! once per engine invocation so retry iterations can never reach
//! contradictory verdicts.

use crate::{
    api::{PolicyIdentity, RunConfiguration},
    results::{TestIdentity, TestResults},
};

/// Immutable view of the policy service's quarantine and flaky sets for the
/// duration of one engine invocation.
#[derive(Clone, Debug, Default)]
pub struct PolicySnapshot {
    quarantined: Vec<PolicyIdentity>,
    flaky: Vec<PolicyIdentity>,
}

impl PolicySnapshot {
    pub fn new(configuration: RunConfiguration) -> Self {
        Self {
            quarantined: configuration.quarantined_tests,
            flaky: configuration.flaky_tests,
        }
    }

    pub fn is_quarantined(&self, identity: &TestIdentity) -> bool {
        self.quarantined.iter().any(|entry| entry.matches(identity))
    }

    pub fn is_flaky(&self, identity: &TestIdentity) -> bool {
        self.flaky.iter().any(|entry| entry.matches(identity))
    }
}

/// The classification of one test in the latest attempt set.
///
/// Quarantined failures keep their flakiness: quarantine changes the
/// verdict, not the retry budget the test draws from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestTag {
    Pass,
    Quarantined { flaky: bool },
    FlakyFailing,
    NonFlakyFailing,
}

/// The tags for every test in a result set, index-aligned with
/// `results.tests`, plus the derived counts the retry planner works from.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub tags: Vec<TestTag>,
    pub other_errors: usize,
}

impl Reconciliation {
    pub fn quarantined(&self) -> usize {
        self.count(|tag| matches!(tag, TestTag::Quarantined { .. }))
    }

    pub fn flaky_failing(&self) -> usize {
        self.count(|tag| matches!(tag, TestTag::FlakyFailing))
    }

    pub fn non_flaky_failing(&self) -> usize {
        self.count(|tag| matches!(tag, TestTag::NonFlakyFailing))
    }

    /// Indices of tests still failing and not quarantined: the failures that
    /// would fail the suite.
    pub fn failing_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.tags.iter().enumerate().filter_map(|(index, tag)| {
            matches!(tag, TestTag::FlakyFailing | TestTag::NonFlakyFailing).then_some(index)
        })
    }

    /// Every failing test, quarantined or not, with the budget it draws
    /// from: `(index, uses_flaky_budget)`. Quarantined tests are still
    /// retried; only the verdict ignores them.
    pub fn retry_candidates(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.tags
            .iter()
            .enumerate()
            .filter_map(|(index, tag)| match tag {
                TestTag::Pass => None,
                TestTag::FlakyFailing => Some((index, true)),
                TestTag::NonFlakyFailing => Some((index, false)),
                TestTag::Quarantined { flaky } => Some((index, *flaky)),
            })
    }

    /// True when nothing would fail the suite: no live failures and no
    /// other-errors. Quarantined failures do not count.
    pub fn is_clean(&self) -> bool {
        self.flaky_failing() == 0 && self.non_flaky_failing() == 0 && self.other_errors == 0
    }

    fn count(&self, wanted: impl Fn(&TestTag) -> bool) -> usize {
        self.tags.iter().filter(|tag| wanted(tag)).count()
    }
}

/// Tags each test in `results` against `policy`.
///
/// The effective status is the last attempt's status. A failing test is
/// quarantined if its identity is in the quarantine set; a failing,
/// non-quarantined test is flaky-failing if its identity is in the flaky
/// set. Other-errors are counted but never quarantinable.
pub fn reconcile(results: &TestResults, policy: &PolicySnapshot) -> Reconciliation {
    let tags = results
        .tests
        .iter()
        .map(|test| {
            if test.effective_status().is_passing() {
                return TestTag::Pass;
            }
            let identity = test.identity();
            if policy.is_quarantined(&identity) {
                TestTag::Quarantined {
                    flaky: policy.is_flaky(&identity),
                }
            } else if policy.is_flaky(&identity) {
                TestTag::FlakyFailing
            } else {
                TestTag::NonFlakyFailing
            }
        })
        .collect();

    Reconciliation {
        tags,
        other_errors: results.other_errors.len(),
    }
}
