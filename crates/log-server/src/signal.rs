// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A resettable boolean flag that threads can wait on with a timeout.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn set(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
    }

    pub(crate) fn clear(&self) {
        *self.state.lock() = false;
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// Blocks until the flag is set or `timeout` elapses; returns the flag.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut state = self.state.lock();
        while !*state {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
        *state
    }
}

/// The instant `timeout` from now, or `None` when it is not representable.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// The rendezvous points shared by a server and its worker thread.
#[derive(Debug, Default)]
pub(crate) struct Signals {
    /// Set by the worker once bound; cleared by the controller to stop it.
    pub(crate) running: Signal,
    /// Set by the worker when it reads the stop sentinel.
    pub(crate) sentinel: Signal,
    /// Set when the worker thread is about to exit, whatever the reason.
    pub(crate) terminated: Signal,
}

/// Sets [`Signals::terminated`] when dropped, including on unwind.
pub(crate) struct TerminatedGuard<'a>(pub(crate) &'a Signal);

impl Drop for TerminatedGuard<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}
