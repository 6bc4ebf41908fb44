// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Session grant state.
//!
//! A single tagged variant instead of a pair of booleans: "admin implies
//! regular" is enforced by the type, and the pending-vote id lives inside
//! the `Regular` grant so it cannot outlive it.

use serde::{Deserialize, Serialize};

use crate::types::CardId;

/// The current authorization grant of the terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session. The idle prompt is showing.
    #[default]
    Idle,
    /// A fresh regular card was verified; the id is pending a vote.
    Regular(CardId),
    /// An admin card was verified. Grants every regular check as well.
    Admin,
}

impl SessionState {
    /// Whether a regular-access check passes. Admin is a superset.
    pub fn grants_regular(&self) -> bool {
        matches!(self, Self::Regular(_) | Self::Admin)
    }

    /// Whether an admin-access check passes.
    pub fn grants_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// The card id awaiting a vote, if a regular grant is active.
    pub fn pending_vote(&self) -> Option<&CardId> {
        match self {
            Self::Regular(id) => Some(id),
            Self::Idle | Self::Admin => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Regular(_) => "REGULAR",
            Self::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_grants_nothing() {
        let state = SessionState::Idle;
        assert!(!state.grants_regular());
        assert!(!state.grants_admin());
        assert!(state.pending_vote().is_none());
    }

    #[test]
    fn test_admin_is_superset_of_regular() {
        let state = SessionState::Admin;
        assert!(state.grants_regular());
        assert!(state.grants_admin());
        // Admin sessions are not vote sessions.
        assert!(state.pending_vote().is_none());
    }

    #[test]
    fn test_regular_grant_carries_pending_vote() {
        let id = CardId::raw("Y".repeat(crate::types::ID_LENGTH));
        let state = SessionState::Regular(id.clone());

        assert!(state.grants_regular());
        assert!(!state.grants_admin());
        assert_eq!(state.pending_vote(), Some(&id));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", SessionState::Idle), "IDLE");
        assert_eq!(format!("{}", SessionState::Admin), "ADMIN");
    }
}
