// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! The access controller: keystroke accumulation, scan classification and
//! the time-bounded session it grants.
//!
//! One event-delivery context calls [`AccessController::handle_event`] per
//! physical keystroke, in arrival order. The attempt and access-expiry
//! timers fire from their own threads and mutate the same state, so every
//! field they share — scan buffer, attempt flag, session grant, hint text
//! and both timer epochs — lives in [`CoreState`] behind a single mutex.
//! Timer callbacks present a generation token and exit if it is stale; see
//! [`crate::timer`].
//!
//! ## One-shot consumption
//!
//! `check_regular_verified(true)` / `check_admin_verified(true)` report the
//! grant and, when it is present, atomically revoke it: a granted session
//! authorizes exactly one privileged action. The access-expiry timer is the
//! fail-safe for sessions nobody consumes.

pub mod classify;
pub mod enroll;
pub mod state;

pub use classify::classify;
pub use enroll::AdminEnrollment;
pub use state::SessionState;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

use crate::audit::{self, AuditEvent};
use crate::config::KioskConfig;
use crate::security::resilient_lock;
use crate::store::UserStore;
use crate::timer::{self, TimerEpoch};
use crate::types::{Key, ScanOutcome};

/// Which grant a check interrogates.
#[derive(Debug, Clone, Copy)]
enum GrantCheck {
    Regular,
    Admin,
}

/// All state shared between the keystroke path and the timer callbacks.
#[derive(Debug)]
struct CoreState {
    /// Accumulated scan characters. Cleared on terminator handling and on
    /// attempt-timer expiry.
    buffer: String,
    /// True from the first character of an attempt until the terminator or
    /// the attempt timer resolves it.
    attempt_in_progress: bool,
    session: SessionState,
    hint: String,
    attempt_timer: TimerEpoch,
    expiry_timer: TimerEpoch,
}

struct Inner {
    state: Mutex<CoreState>,
    store: Arc<dyn UserStore>,
    config: KioskConfig,
}

/// Kiosk access-control front end. Cheap to clone; clones share state.
pub struct AccessController {
    inner: Arc<Inner>,
}

impl Clone for AccessController {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AccessController {
    pub fn new(store: Arc<dyn UserStore>, config: KioskConfig) -> Self {
        let state = CoreState {
            buffer: String::new(),
            attempt_in_progress: false,
            session: SessionState::Idle,
            hint: config.idle_prompt.clone(),
            attempt_timer: TimerEpoch::new(),
            expiry_timer: TimerEpoch::new(),
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                store,
                config,
            }),
        }
    }

    /// Handle one physical keystroke.
    pub fn handle_event(&self, key: Key) {
        let mut st = resilient_lock(&self.inner.state);
        match key {
            Key::Enter => self.finish_attempt(&mut st),
            // Not part of a card identifier: no buffer or timer effect.
            Key::Submit | Key::Cancel => {}
            Key::Char(c) => self.accumulate(&mut st, c),
        }
    }

    /// Current hint text for the display layer.
    pub fn hint(&self) -> String {
        resilient_lock(&self.inner.state).hint.clone()
    }

    /// Read-only regular-verified flag (admin grants count).
    pub fn is_regular_verified(&self) -> bool {
        resilient_lock(&self.inner.state).session.grants_regular()
    }

    /// Read-only admin-verified flag.
    pub fn is_admin_verified(&self) -> bool {
        resilient_lock(&self.inner.state).session.grants_admin()
    }

    /// Snapshot of the session grant.
    pub fn session_state(&self) -> SessionState {
        resilient_lock(&self.inner.state).session.clone()
    }

    /// Report the regular grant, revoking it when `consume` is set and it
    /// was present.
    pub fn check_regular_verified(&self, consume: bool) -> bool {
        self.check(GrantCheck::Regular, consume)
    }

    /// Report the admin grant, revoking it when `consume` is set and it was
    /// present. Consumption clears the whole grant: an admin session
    /// consumed here no longer passes regular checks either.
    pub fn check_admin_verified(&self, consume: bool) -> bool {
        self.check(GrantCheck::Admin, consume)
    }

    /// Commit the pending vote and consume the session in one step.
    ///
    /// Returns `Ok(false)` when no regular grant is pending (nothing to
    /// commit; admin sessions never carry a pending vote). A store write
    /// failure leaves the session untouched so the swipe can be retried.
    pub fn register_vote(&self) -> Result<bool> {
        let mut st = resilient_lock(&self.inner.state);
        let Some(id) = st.session.pending_vote().cloned() else {
            return Ok(false);
        };

        self.inner
            .store
            .set_voted(&id, true)
            .context("Failed to record vote in the user store")?;

        st.session = SessionState::Idle;
        st.expiry_timer.cancel();
        st.hint = self.inner.config.idle_prompt.clone();
        audit::record(AuditEvent::VoteRegistered, Some(&id));
        Ok(true)
    }

    pub fn config(&self) -> &KioskConfig {
        &self.inner.config
    }

    fn check(&self, which: GrantCheck, consume: bool) -> bool {
        let mut st = resilient_lock(&self.inner.state);
        let value = match which {
            GrantCheck::Regular => st.session.grants_regular(),
            GrantCheck::Admin => st.session.grants_admin(),
        };

        if consume && value {
            st.session = SessionState::Idle;
            st.expiry_timer.cancel();
            st.hint = self.inner.config.idle_prompt.clone();
            audit::record(AuditEvent::SessionConsumed, None);
        }
        value
    }

    /// Ordinary character key: accumulate, debouncing a new attempt.
    fn accumulate(&self, st: &mut CoreState, c: char) {
        if !st.attempt_in_progress {
            st.attempt_in_progress = true;
            st.buffer.clear();
            // A keystroke while nothing is being confirmed silently
            // invalidates a lingering unconsumed grant, so a stale session
            // cannot survive into an unrelated new scan.
            if st.session != SessionState::Idle {
                tracing::info!(
                    "SESSION: new scan attempt invalidates unconsumed {} grant",
                    st.session
                );
                st.session = SessionState::Idle;
            }
            st.expiry_timer.cancel();
            self.arm_attempt_timer(st);
        }

        st.buffer.push(c);
        // Obfuscated echo: one glyph per buffered character, never the input.
        let glyphs = st.buffer.chars().count();
        st.hint = self.inner.config.echo_glyph.to_string().repeat(glyphs);
    }

    /// Terminator: classify the buffer and apply the outcome.
    fn finish_attempt(&self, st: &mut CoreState) {
        st.attempt_timer.cancel();
        st.attempt_in_progress = false;

        let outcome = classify(&st.buffer, self.inner.store.as_ref());
        audit::record_scan(&outcome);
        self.apply_outcome(st, outcome);
        st.buffer.clear();
    }

    fn apply_outcome(&self, st: &mut CoreState, outcome: ScanOutcome) {
        let config = &self.inner.config;
        match outcome {
            ScanOutcome::AdminGranted(_) => {
                st.session = SessionState::Admin;
                st.hint = config.admin_verified_message.clone();
                self.arm_expiry_timer(st);
            }
            ScanOutcome::RegularGranted(id) => {
                st.session = SessionState::Regular(id);
                st.hint = config.regular_verified_message.clone();
                self.arm_expiry_timer(st);
            }
            ScanOutcome::AlreadyVoted(_) => {
                st.session = SessionState::Idle;
                st.expiry_timer.cancel();
                st.hint = config.already_voted_message.clone();
            }
            ScanOutcome::Invalid => {
                st.hint = config.invalid_message.clone();
            }
            ScanOutcome::StoreError => {
                // Fail-closed: a lookup failure denies access.
                st.session = SessionState::Idle;
                st.expiry_timer.cancel();
                st.hint = config.invalid_message.clone();
            }
        }
    }

    /// (Re)start the attempt timer. Replaces any previous arming.
    fn arm_attempt_timer(&self, st: &mut CoreState) {
        let token = st.attempt_timer.arm();
        let inner = Arc::clone(&self.inner);
        timer::spawn_after("attempt", self.inner.config.attempt_window, move || {
            let mut st = resilient_lock(&inner.state);
            if !st.attempt_timer.is_current(token) {
                return;
            }
            st.attempt_in_progress = false;
            st.buffer.clear();
            // Leave a just-granted session's hint alone.
            if !st.session.grants_regular() {
                st.hint = inner.config.idle_prompt.clone();
            }
            tracing::debug!("ATTEMPT: window elapsed, partial scan discarded");
        });
    }

    /// (Re)start the access-expiry timer. Replaces any previous arming.
    fn arm_expiry_timer(&self, st: &mut CoreState) {
        let token = st.expiry_timer.arm();
        let inner = Arc::clone(&self.inner);
        timer::spawn_after("access-expiry", self.inner.config.access_window, move || {
            let mut st = resilient_lock(&inner.state);
            if !st.expiry_timer.is_current(token) {
                return;
            }
            tracing::info!("SESSION: {} grant expired unconsumed", st.session);
            st.session = SessionState::Idle;
            st.hint = inner.config.idle_prompt.clone();
            audit::record(AuditEvent::SessionExpired, None);
        });
    }
}
