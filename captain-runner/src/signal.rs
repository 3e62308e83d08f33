// Copyright (c) The captain Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals during a suite run.
//!
//! Captain never kills the child on SIGINT; the signal is forwarded and the
//! engine keeps waiting. Termination signals start the shutdown grace
//! window instead.

use std::io;

/// The kind of signal handling to set up for a suite run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalHandlerKind {
    /// Capture interrupt and termination signals depending on the platform.
    Standard,
    /// A no-op handler. Useful for tests.
    Noop,
}

impl SignalHandlerKind {
    pub fn build(self) -> io::Result<SignalHandler> {
        match self {
            Self::Standard => SignalHandler::new(),
            Self::Noop => Ok(SignalHandler::noop()),
        }
    }
}

/// The signal handler implementation.
#[derive(Debug)]
pub struct SignalHandler {
    signals: Option<imp::Signals>,
}

impl SignalHandler {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            signals: Some(imp::Signals::new()?),
        })
    }

    pub fn noop() -> Self {
        Self { signals: None }
    }

    pub async fn recv(&mut self) -> Option<ShutdownEvent> {
        match &mut self.signals {
            Some(signals) => signals.recv().await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::ShutdownEvent;
    use std::io;
    use tokio::signal::unix::{signal, Signal, SignalKind};

    #[derive(Debug)]
    pub(super) struct Signals {
        int: Signal,
        term: Signal,
        hup: Signal,
    }

    impl Signals {
        pub(super) fn new() -> io::Result<Self> {
            Ok(Self {
                int: signal(SignalKind::interrupt())?,
                term: signal(SignalKind::terminate())?,
                hup: signal(SignalKind::hangup())?,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            tokio::select! {
                _ = self.int.recv() => Some(ShutdownEvent::Interrupt),
                _ = self.term.recv() => Some(ShutdownEvent::Term),
                _ = self.hup.recv() => Some(ShutdownEvent::Hangup),
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::ShutdownEvent;
    use std::io;
    use tokio::signal::windows::{ctrl_c, CtrlC};

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
    }

    impl Signals {
        pub(super) fn new() -> io::Result<Self> {
            Ok(Self { ctrl_c: ctrl_c()? })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            self.ctrl_c.recv().await.map(|()| ShutdownEvent::Interrupt)
        }
    }
}

/// A signal event observed while a child is running.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// Forwarded to the child; the engine keeps waiting for a clean exit.
    Interrupt,
    /// Starts the terminate-then-kill grace window.
    Term,
    /// Treated like Term.
    Hangup,
}
