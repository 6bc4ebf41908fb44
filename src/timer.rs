// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! One-shot timers with generation tokens.
//!
//! Each timer kind (attempt, access-expiry) is represented by a
//! [`TimerEpoch`] owned by the state it protects and living under the same
//! mutex. Arming bumps the epoch and yields a [`TimerToken`]; canceling
//! bumps the epoch without arming. A firing callback re-acquires the state
//! mutex and checks its token against the epoch before touching anything,
//! so a timer that was replaced or canceled after its thread woke up is a
//! structural no-op — the cancel-then-fire race cannot corrupt state.
//!
//! At most one token per kind is ever current, which is exactly the "no
//! leaked or duplicate timers" guarantee: older threads may still be
//! sleeping, but none of them can act.

use std::thread;
use std::time::Duration;

/// Token identifying one arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

/// Generation counter for one timer kind.
///
/// Must live under the same mutex as the state its callback mutates; all
/// three operations assume the caller holds that lock.
#[derive(Debug, Default)]
pub struct TimerEpoch {
    current: u64,
}

impl TimerEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer: invalidates any previously issued token and returns
    /// the token the new firing must present.
    pub fn arm(&mut self) -> TimerToken {
        self.current += 1;
        TimerToken(self.current)
    }

    /// Cancel without re-arming. Canceling an already-fired or never-armed
    /// timer is a no-op in effect: there is simply no current token left.
    pub fn cancel(&mut self) {
        self.current += 1;
    }

    /// Whether `token` belongs to the most recent arming.
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.current == token.0
    }
}

/// Run `callback` on a dedicated thread after `delay`.
///
/// The callback is responsible for the token check; this function only
/// provides the independent timer execution context.
pub fn spawn_after<F>(name: &str, delay: Duration, callback: F)
where
    F: FnOnce() + Send + 'static,
{
    let builder = thread::Builder::new().name(format!("swipegate-{}", name));
    let spawned = builder.spawn(move || {
        thread::sleep(delay);
        callback();
    });

    if let Err(e) = spawned {
        // Out of threads is not recoverable mid-swipe; the state machine
        // stays consistent, the window just never fires.
        tracing::error!("TIMER: failed to spawn {} thread: {}", name, e);
    }
}
