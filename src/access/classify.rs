// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Scan classification against the user store.

use crate::store::UserStore;
use crate::types::{CardId, ScanOutcome};

/// Classify a terminated scan buffer.
///
/// Admin status is checked before vote status and takes precedence: an
/// admin card re-authenticates even when the same id is marked as having
/// voted. Store lookup failures are fail-closed — they classify as
/// [`ScanOutcome::StoreError`], a denial.
pub fn classify(buffer: &str, store: &dyn UserStore) -> ScanOutcome {
    let Some(id) = CardId::from_scan(buffer) else {
        return ScanOutcome::Invalid;
    };

    let is_admin = match store.is_admin(&id) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("CLASSIFY: admin lookup failed, denying access: {}", e);
            return ScanOutcome::StoreError;
        }
    };
    if is_admin {
        return ScanOutcome::AdminGranted(id);
    }

    match store.has_voted(&id) {
        Ok(true) => ScanOutcome::AlreadyVoted(id),
        Ok(false) => ScanOutcome::RegularGranted(id),
        Err(e) => {
            tracing::error!("CLASSIFY: vote lookup failed, denying access: {}", e);
            ScanOutcome::StoreError
        }
    }
}
