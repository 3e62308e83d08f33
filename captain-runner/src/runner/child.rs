// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subprocess lifecycle: spawning the suite command and its retries, signal
//! forwarding, and the terminate-then-kill grace window.

use crate::{
    errors::SystemError,
    signal::{ShutdownEvent, SignalHandler},
};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How long a child gets to exit cleanly after SIGTERM before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Runs `argv` to completion and returns its exit code.
///
/// A child that cannot be launched is a [`SystemError`]; a child that exits
/// nonzero is not an error, just a code. Interrupts are forwarded and the
/// wait continues; termination signals forward SIGTERM and arm the grace
/// window.
pub(crate) async fn run_command(
    argv: &[String],
    env_overrides: &[(String, String)],
    signal: &mut SignalHandler,
) -> Result<i32, SystemError> {
    let (program, args) = argv
        .split_first()
        .expect("command vectors are never empty");

    let mut command = Command::new(program);
    command.args(args);
    for (name, value) in env_overrides {
        command.env(name, value);
    }
    debug!(command = %shell_words::join(argv), "spawning");

    let mut child = command.spawn().map_err(|err| SystemError {
        command: shell_words::join(argv),
        err,
    })?;

    let mut terminating = false;
    loop {
        if terminating {
            tokio::select! {
                status = child.wait() => return Ok(exit_code(status)),
                () = tokio::time::sleep(KILL_GRACE) => {
                    warn!("child did not exit within the grace window; killing");
                    let _ = child.start_kill();
                    let status = child.wait().await;
                    return Ok(exit_code(status));
                }
            }
        } else {
            tokio::select! {
                status = child.wait() => return Ok(exit_code(status)),
                Some(event) = signal.recv() => match event {
                    ShutdownEvent::Interrupt => {
                        debug!("forwarding interrupt to child");
                        forward_signal(&child, libc_signal(event));
                    }
                    ShutdownEvent::Term | ShutdownEvent::Hangup => {
                        debug!("forwarding terminate to child");
                        forward_signal(&child, libc_signal(event));
                        terminating = true;
                    }
                },
            }
        }
    }
}

fn exit_code(status: std::io::Result<std::process::ExitStatus>) -> i32 {
    match status {
        Ok(status) => status.code().unwrap_or_else(|| {
            // Terminated by signal; conventionally 128 + signal number, but
            // the number is unavailable portably.
            1
        }),
        Err(_) => 1,
    }
}

#[cfg(unix)]
fn libc_signal(event: ShutdownEvent) -> i32 {
    match event {
        ShutdownEvent::Interrupt => libc::SIGINT,
        ShutdownEvent::Term => libc::SIGTERM,
        ShutdownEvent::Hangup => libc::SIGHUP,
    }
}

#[cfg(unix)]
fn forward_signal(child: &Child, signal: i32) {
    if let Some(pid) = child.id() {
        // SAFETY: sending a signal to a pid we own.
        unsafe {
            libc::kill(pid as i32, signal);
        }
    }
}

#[cfg(not(unix))]
fn libc_signal(_event: ShutdownEvent) -> i32 {
    0
}

#[cfg(not(unix))]
fn forward_signal(_child: &Child, _signal: i32) {}
