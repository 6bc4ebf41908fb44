// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Admin enrollment: add or remove the admin flag for a scanned card.
//!
//! A simplified variant of the main keystroke flow: one lightweight
//! accumulator shared by both directions, no timers, no debounce and no
//! session interaction — there is no competing verified-session state to
//! protect here. The hint channel is separate from the access flow's.

use std::sync::{Arc, Mutex};

use crate::audit::{self, AuditEvent};
use crate::config::KioskConfig;
use crate::security::resilient_lock;
use crate::store::UserStore;
use crate::types::{CardId, Key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnrollAction {
    Add,
    Remove,
}

#[derive(Debug)]
struct EnrollState {
    buffer: String,
    hint: String,
}

/// Admin enrollment flows over a shared accumulator.
pub struct AdminEnrollment {
    state: Mutex<EnrollState>,
    store: Arc<dyn UserStore>,
    config: KioskConfig,
}

impl AdminEnrollment {
    pub fn new(store: Arc<dyn UserStore>, config: KioskConfig) -> Self {
        let state = EnrollState {
            buffer: String::new(),
            hint: config.idle_prompt.clone(),
        };
        Self {
            state: Mutex::new(state),
            store,
            config,
        }
    }

    /// Current enrollment hint text.
    pub fn hint(&self) -> String {
        resilient_lock(&self.state).hint.clone()
    }

    /// Feed a keystroke to the add-admin flow.
    ///
    /// Returns true only when a terminator keystroke enrolled a new admin.
    pub fn handle_new_admin(&self, key: Key) -> bool {
        self.handle(key, EnrollAction::Add)
    }

    /// Feed a keystroke to the remove-admin flow.
    ///
    /// Returns true only when a terminator keystroke removed an admin.
    pub fn handle_remove_admin(&self, key: Key) -> bool {
        self.handle(key, EnrollAction::Remove)
    }

    fn handle(&self, key: Key, action: EnrollAction) -> bool {
        let mut st = resilient_lock(&self.state);
        match key {
            Key::Enter => self.finish(&mut st, action),
            Key::Submit | Key::Cancel => false,
            Key::Char(c) => {
                st.buffer.push(c);
                let glyphs = st.buffer.chars().count();
                st.hint = self.config.echo_glyph.to_string().repeat(glyphs);
                false
            }
        }
    }

    fn finish(&self, st: &mut EnrollState, action: EnrollAction) -> bool {
        let id = CardId::from_scan(&st.buffer);
        st.buffer.clear();

        let Some(id) = id else {
            st.hint = self.config.invalid_message.clone();
            return false;
        };

        let is_admin = match self.store.is_admin(&id) {
            Ok(value) => value,
            Err(e) => {
                // Fail-closed: no mutation on a store we cannot read.
                tracing::error!("ENROLL: admin lookup failed: {}", e);
                st.hint = self.config.invalid_message.clone();
                return false;
            }
        };

        match action {
            EnrollAction::Add => {
                if is_admin {
                    st.hint = self.config.already_admin_message.clone();
                    return false;
                }
                if let Err(e) = self.store.set_admin(&id, true) {
                    tracing::error!("ENROLL: failed to add admin: {}", e);
                    st.hint = self.config.invalid_message.clone();
                    return false;
                }
                st.hint = self.config.admin_added_message.clone();
                audit::record(AuditEvent::AdminAdded, Some(&id));
                true
            }
            EnrollAction::Remove => {
                if !is_admin {
                    st.hint = self.config.not_admin_message.clone();
                    return false;
                }
                if let Err(e) = self.store.set_admin(&id, false) {
                    tracing::error!("ENROLL: failed to remove admin: {}", e);
                    st.hint = self.config.invalid_message.clone();
                    return false;
                }
                st.hint = self.config.admin_removed_message.clone();
                audit::record(AuditEvent::AdminRemoved, Some(&id));
                true
            }
        }
    }
}
