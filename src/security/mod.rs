// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Security utilities for the kiosk core.
//!
//! The shared session state is mutated from the keystroke path and from
//! asynchronously-firing timer threads; every such mutation must hold the
//! one state mutex, acquired through the poison-recovering helpers here so
//! a panic in one path can never take the terminal out of service.

pub mod locks;

pub use locks::{resilient_lock, resilient_read, resilient_write};
