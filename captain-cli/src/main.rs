// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod dispatch;
mod errors;

fn main() {
    std::process::exit(dispatch::main_impl());
}
