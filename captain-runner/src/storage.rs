// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted per-suite state under `.captain/` in the working directory:
//! the latest normalized results and the timings derived from them. Written
//! only when `--update-stored-results` is set.

use crate::{
    api::TestFileTiming,
    errors::InternalError,
    reporting,
    results::TestResults,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

pub const STORAGE_DIR: &str = ".captain";

#[derive(Clone, Debug)]
pub struct SuiteStorage {
    root: Utf8PathBuf,
}

impl SuiteStorage {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn in_working_directory() -> Self {
        Self::new(STORAGE_DIR)
    }

    fn suite_dir(&self, suite_id: &str) -> Utf8PathBuf {
        self.root.join(suite_id)
    }

    /// Stores the merged results in the canonical schema plus the timing
    /// summary derived from them.
    pub fn store(&self, suite_id: &str, results: &TestResults) -> Result<(), InternalError> {
        let dir = self.suite_dir(suite_id);
        std::fs::create_dir_all(&dir).map_err(|err| InternalError::Io {
            path: dir.clone(),
            err,
        })?;

        write(&dir.join("test-results.json"), reporting::render_json(results)?)?;
        write(
            &dir.join("test-timings.json"),
            serde_json::to_string_pretty(&derive_timings(results))?,
        )?;
        Ok(())
    }
}

fn write(path: &Utf8Path, contents: String) -> Result<(), InternalError> {
    std::fs::write(path, contents).map_err(|err| InternalError::Io {
        path: path.to_owned(),
        err,
    })
}

/// Sums last-attempt durations per file. Tests with no location or no
/// duration contribute nothing.
pub fn derive_timings(results: &TestResults) -> Vec<TestFileTiming> {
    let mut by_file: IndexMap<String, u64> = IndexMap::new();
    for test in &results.tests {
        let Some(location) = &test.location else {
            continue;
        };
        let Some(duration) = test.attempts.last().and_then(|attempt| attempt.duration) else {
            continue;
        };
        *by_file.entry(location.file.clone()).or_default() +=
            u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    }
    by_file
        .into_iter()
        .map(|(file, duration_ns)| TestFileTiming { file, duration_ns })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{Attempt, Framework, Location, Status, Test};
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn timed_test(name: &str, file: &str, millis: u64) -> Test {
        Test::new(
            name,
            Attempt::new(Status::Successful).with_duration(Duration::from_millis(millis)),
        )
        .with_location(Location::new(file, None))
    }

    #[test]
    fn derives_timings_per_file() {
        let results = TestResults::new(
            Framework::ruby_rspec(),
            vec![
                timed_test("a", "spec/a_spec.rb", 10),
                timed_test("b", "spec/a_spec.rb", 5),
                timed_test("c", "spec/b_spec.rb", 7),
                Test::new("no location", Attempt::new(Status::Successful)),
            ],
            Vec::new(),
        );

        let timings = derive_timings(&results);
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].file, "spec/a_spec.rb");
        assert_eq!(timings[0].duration_ns, 15_000_000);
        assert_eq!(timings[1].file, "spec/b_spec.rb");
        assert_eq!(timings[1].duration_ns, 7_000_000);
    }

    #[test]
    fn stores_results_and_timings() {
        let dir = tempdir().expect("tempdir");
        let storage = SuiteStorage::new(dir.path());
        let results = TestResults::new(
            Framework::ruby_rspec(),
            vec![timed_test("a", "spec/a_spec.rb", 10)],
            Vec::new(),
        );

        storage.store("my-suite", &results).expect("stores");

        assert!(dir.path().join("my-suite/test-results.json").exists());
        let timings = std::fs::read_to_string(dir.path().join("my-suite/test-timings.json"))
            .expect("timings file");
        assert!(timings.contains("spec/a_spec.rb"));
    }
}
