// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Kiosk configuration: timer windows and operator-facing hint strings.
//!
//! The access window is a hard-capped fail-safe: a granted session that is
//! never consumed must not outlive it. Requests above the cap are clamped,
//! never honored.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard upper bound on the access-expiry window: 5 minutes.
/// An unattended kiosk session may never remain valid longer than this.
pub const MAX_ACCESS_WINDOW_SECS: u64 = 300;

/// Default access-expiry window: 60 seconds.
pub const DEFAULT_ACCESS_WINDOW_SECS: u64 = 60;

/// Default attempt window: a partially-typed scan is discarded after this.
pub const DEFAULT_ATTEMPT_WINDOW_SECS: u64 = 5;

/// Kiosk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskConfig {
    /// How long a partial scan may stay pending before the buffer is cleared.
    pub attempt_window: Duration,

    /// How long a granted session stays valid before automatic revocation.
    /// Clamped to [`MAX_ACCESS_WINDOW_SECS`].
    pub access_window: Duration,

    /// Glyph echoed once per buffered character instead of the raw input.
    pub echo_glyph: char,

    /// Prompt shown while no scan or session is active.
    pub idle_prompt: String,

    /// Hint after an admin card is verified.
    pub admin_verified_message: String,

    /// Hint after a fresh regular card is verified.
    pub regular_verified_message: String,

    /// Hint when a card has already voted.
    pub already_voted_message: String,

    /// Hint for an unclassifiable scan.
    pub invalid_message: String,

    /// Enrollment hints.
    pub admin_added_message: String,
    pub already_admin_message: String,
    pub admin_removed_message: String,
    pub not_admin_message: String,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            attempt_window: Duration::from_secs(DEFAULT_ATTEMPT_WINDOW_SECS),
            access_window: Duration::from_secs(DEFAULT_ACCESS_WINDOW_SECS),
            echo_glyph: '*',
            idle_prompt: "Please Swipe Your Card".to_string(),
            admin_verified_message: "Admin Card Verified".to_string(),
            regular_verified_message: "Press Thumb to Vote".to_string(),
            already_voted_message: "Already Voted".to_string(),
            invalid_message: "Invalid".to_string(),
            admin_added_message: "New Admin Added".to_string(),
            already_admin_message: "Already an Admin".to_string(),
            admin_removed_message: "Admin Removed".to_string(),
            not_admin_message: "Not an Admin".to_string(),
        }
    }
}

impl KioskConfig {
    /// Create a configuration with custom windows, clamping the access
    /// window to the hard maximum.
    pub fn custom(attempt_window: Duration, access_window: Duration) -> Self {
        let cap = Duration::from_secs(MAX_ACCESS_WINDOW_SECS);
        let clamped_access = access_window.min(cap);

        if access_window > cap {
            tracing::warn!(
                "ACCESS_WINDOW: requested {}s exceeds the {}s maximum, clamped",
                access_window.as_secs(),
                MAX_ACCESS_WINDOW_SECS
            );
        }

        Self {
            attempt_window,
            access_window: clamped_access,
            ..Self::default()
        }
    }
}
