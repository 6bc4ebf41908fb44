// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! swipegate - card-swipe access control for shared kiosk terminals
//!
//! A card-swipe reader emits a card's embedded identifier as a burst of
//! keystrokes terminated by a delimiter key. Swipegate turns that stream
//! into an authenticated, time-bounded session granting regular or
//! administrative access to a single shared terminal.
//!
//! # Core Modules
//!
//! - [`access`] - keystroke accumulation, scan classification, session state
//! - [`store`] - the narrow user/vote store contract and its implementations
//! - [`timer`] - one-shot timers with generation tokens
//! - [`audit`] - tamper-evident audit logging
//! - [`config`] - timer windows and operator-facing hint strings
//! - [`security`] - poison-recovering lock helpers
//! - [`types`] - canonical shared types

pub mod access;
pub mod audit;
pub mod config;
pub mod security;
pub mod store;
pub mod timer;
pub mod types;

// Re-export commonly used types from the types module
pub use types::{CardId, Key, ScanOutcome, ID_LENGTH};

// Re-export the access core
pub use access::{classify, AccessController, AdminEnrollment, SessionState};

// Re-export store types
pub use store::{JsonStore, MemoryStore, UserRecord, UserStore};

// Re-export configuration
pub use config::{
    KioskConfig, DEFAULT_ACCESS_WINDOW_SECS, DEFAULT_ATTEMPT_WINDOW_SECS, MAX_ACCESS_WINDOW_SECS,
};

// Re-export audit types
pub use audit::{
    global_audit_logger, init_audit_logger, mask_card_id, AuditEntry, AuditEvent, AuditLogger,
};

// Re-export timer plumbing
pub use timer::{spawn_after, TimerEpoch, TimerToken};
