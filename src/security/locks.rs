// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Poison-recovering lock helpers.
//!
//! A kiosk that panics out of a swipe leaves a poisoned lock behind; if the
//! next swipe then panics on acquisition, the terminal is dead until a staff
//! member power-cycles it. These helpers log the poisoning as a security
//! event and recover the guard, degrading to possibly-stale state instead of
//! an unusable terminal.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a mutex, recovering from poisoning if necessary.
///
/// The core session state sits behind a single mutex shared between the
/// keystroke path and both timer callbacks; this is the only way any of
/// them may acquire it.
#[inline]
pub fn resilient_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_MUTEX",
                "Mutex was poisoned during acquisition. Recovering so the \
                 terminal stays in service. A thread previously panicked \
                 while holding this lock; investigate the panic in the logs."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a read lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_READ",
                "RwLock was poisoned during read acquisition. Recovering."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_WRITE",
                "RwLock was poisoned during write acquisition. Recovering."
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_resilient_lock_normal() {
        let lock = Mutex::new(7);
        {
            let mut guard = resilient_lock(&lock);
            *guard = 11;
        }
        assert_eq!(*resilient_lock(&lock), 11);
    }

    #[test]
    fn test_resilient_lock_poisoned() {
        let lock = Arc::new(Mutex::new(7));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.lock().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        // Must recover instead of panicking.
        let guard = resilient_lock(&lock);
        assert_eq!(*guard, 7);
    }

    #[test]
    fn test_resilient_rwlock_poisoned() {
        let lock = Arc::new(RwLock::new(42));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.write().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        let mut guard = resilient_write(&lock);
        *guard = 100;
        drop(guard);

        assert_eq!(*resilient_read(&lock), 100);
    }
}
