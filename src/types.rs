// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Canonical types used across swipegate.
//!
//! This module provides unified type definitions to avoid duplication.

use serde::{Deserialize, Serialize};

/// Number of trailing characters of a scan that identify a card.
///
/// Two reads of the same physical card may differ in leading noise from the
/// reader, but always agree on the trailing `ID_LENGTH` characters. Matching
/// only the trailing window is the card-matching policy, not a bug.
pub const ID_LENGTH: usize = 25;

/// A keystroke symbol delivered by the card reader or kiosk keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Ordinary character key, accumulated into the scan buffer.
    Char(char),
    /// The terminator keystroke: end-of-scan, classify the buffer.
    Enter,
    /// Confirm/submit key. Not part of a card identifier; ignored.
    Submit,
    /// Cancel key. Not part of a card identifier; ignored.
    Cancel,
}

/// A card identifier: the trailing [`ID_LENGTH`]-character window of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    /// Extract the card id from an accumulated scan buffer.
    ///
    /// Returns `None` when fewer than [`ID_LENGTH`] characters were
    /// accumulated. Anything before the trailing window is treated as
    /// reader preamble and discarded.
    pub fn from_scan(buffer: &str) -> Option<Self> {
        let len = buffer.chars().count();
        if len < ID_LENGTH {
            return None;
        }
        Some(Self(buffer.chars().skip(len - ID_LENGTH).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
impl CardId {
    /// Test-only constructor for ids that did not come from a scan.
    pub fn raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Result of classifying a terminated scan against the user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Admin card. Checked before vote status: an admin card always
    /// re-authenticates, even if the same id is marked as having voted.
    AdminGranted(CardId),
    /// Fresh, not-yet-voted card.
    RegularGranted(CardId),
    /// Card already recorded as having voted. No session is granted.
    AlreadyVoted(CardId),
    /// Buffer shorter than [`ID_LENGTH`]. No state mutation beyond the hint.
    Invalid,
    /// Store lookup failed. Fail-closed: treated as a denial, never a grant.
    StoreError,
}

impl ScanOutcome {
    /// Audit tag for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminGranted(_) => "ADMIN_GRANTED",
            Self::RegularGranted(_) => "REGULAR_GRANTED",
            Self::AlreadyVoted(_) => "ALREADY_VOTED",
            Self::Invalid => "INVALID",
            Self::StoreError => "STORE_ERROR",
        }
    }

    /// The card id this outcome refers to, when one was extracted.
    pub fn card_id(&self) -> Option<&CardId> {
        match self {
            Self::AdminGranted(id) | Self::RegularGranted(id) | Self::AlreadyVoted(id) => Some(id),
            Self::Invalid | Self::StoreError => None,
        }
    }
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
