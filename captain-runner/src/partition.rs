// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for partitioning test files across several CI machines.
//!
//! Files with a timing-manifest entry are distributed greedily, longest
//! first onto the least-loaded shard, so shards finish at roughly the same
//! time. Files the manifest has never seen are distributed round-robin in
//! input order.

use crate::{api::TestFileTiming, errors::ConfigurationError};
use std::collections::HashMap;

/// A validated `--index/--total` pair. `index` counts from 0.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartitionConfig {
    pub index: usize,
    pub total: usize,
}

impl PartitionConfig {
    pub fn new(index: usize, total: usize) -> Result<Self, ConfigurationError> {
        if total == 0 || index >= total {
            return Err(ConfigurationError::InvalidPartition { index, total });
        }
        Ok(Self { index, total })
    }
}

/// Returns the files assigned to this shard, preserving input order.
pub fn partition_files(
    files: &[String],
    timings: &[TestFileTiming],
    config: PartitionConfig,
) -> Vec<String> {
    let by_file: HashMap<&str, u64> = timings
        .iter()
        .map(|timing| (timing.file.as_str(), timing.duration_ns))
        .collect();

    let mut assignments = vec![usize::MAX; files.len()];

    // Longest-processing-time-first over the timed files.
    let mut timed: Vec<(usize, u64)> = files
        .iter()
        .enumerate()
        .filter_map(|(position, file)| {
            by_file.get(file.as_str()).map(|nanos| (position, *nanos))
        })
        .collect();
    timed.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut loads = vec![0u64; config.total];
    for (position, nanos) in timed {
        let shard = least_loaded(&loads);
        loads[shard] += nanos;
        assignments[position] = shard;
    }

    // Round-robin over the rest, in input order.
    let mut next = 0usize;
    for (position, file) in files.iter().enumerate() {
        if by_file.contains_key(file.as_str()) {
            continue;
        }
        assignments[position] = next % config.total;
        next += 1;
    }

    files
        .iter()
        .zip(&assignments)
        .filter_map(|(file, shard)| (*shard == config.index).then(|| file.clone()))
        .collect()
}

fn least_loaded(loads: &[u64]) -> usize {
    loads
        .iter()
        .enumerate()
        .min_by_key(|(shard, load)| (**load, *shard))
        .map(|(shard, _)| shard)
        .expect("total shards is nonzero")
}
