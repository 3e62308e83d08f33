// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run engine and its subprocess plumbing.

mod abq;
mod child;
mod imp;

pub use imp::{RunConfig, RunVerdict, SuiteRunner};
