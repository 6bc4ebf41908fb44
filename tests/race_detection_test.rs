// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Race detection tests for swipegate.
//!
//! The keystroke path and both timer kinds mutate the same session state
//! from different threads; these tests hammer those paths concurrently and
//! assert the structural invariants hold. They are designed to surface data
//! races when run with ThreadSanitizer.
//!
//! # Running with ThreadSanitizer
//!
//! ```bash
//! RUSTFLAGS="-Z sanitizer=thread" cargo +nightly test --target x86_64-unknown-linux-gnu --test race_detection_test
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use swipegate::{
    AccessController, AdminEnrollment, CardId, Key, KioskConfig, MemoryStore, UserStore, ID_LENGTH,
};

const CONCURRENCY_LEVEL: usize = 16;
const ITERATIONS_PER_THREAD: usize = 50;

fn scan(tag: char) -> String {
    tag.to_string().repeat(ID_LENGTH)
}

fn swipe(controller: &AccessController, id: &str) {
    for c in id.chars() {
        controller.handle_event(Key::Char(c));
    }
    controller.handle_event(Key::Enter);
}

/// Millisecond-scale windows so both timer kinds fire constantly during the
/// stress runs.
fn twitchy_config() -> KioskConfig {
    KioskConfig::custom(Duration::from_millis(5), Duration::from_millis(10))
}

#[test]
fn test_concurrent_swipes_and_checks() {
    let store = Arc::new(MemoryStore::new());
    let controller = AccessController::new(store, twitchy_config());

    let mut handles = vec![];
    for i in 0..CONCURRENCY_LEVEL {
        let controller = controller.clone();
        handles.push(thread::spawn(move || {
            for j in 0..ITERATIONS_PER_THREAD {
                match (i + j) % 3 {
                    0 => swipe(&controller, &scan('R')),
                    1 => {
                        let _ = controller.check_regular_verified(j % 2 == 0);
                    }
                    _ => {
                        let _ = controller.hint();
                        let _ = controller.is_admin_verified();
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    // Whatever interleaving happened, admin still implies regular.
    if controller.is_admin_verified() {
        assert!(controller.is_regular_verified());
    }
}

#[test]
fn test_timer_storm_leaves_consistent_state() {
    // Arm and replace both timer kinds as fast as possible; stale firings
    // must all be no-ops.
    let store = Arc::new(MemoryStore::new());
    let controller = AccessController::new(store, twitchy_config());

    let mut handles = vec![];
    for _ in 0..CONCURRENCY_LEVEL {
        let controller = controller.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ITERATIONS_PER_THREAD {
                controller.handle_event(Key::Char('x'));
                controller.handle_event(Key::Enter);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    // Let every outstanding timer thread drain.
    thread::sleep(Duration::from_millis(300));

    // Each thread alternates one character with a terminator and every
    // terminator clears the buffer, so at most CONCURRENCY_LEVEL characters
    // (< ID_LENGTH) can ever accumulate: no scan can classify as a grant.
    // The globally last event is some thread's terminator, which rejects the
    // undersized buffer and cancels the attempt timer, so no stale firing
    // may disturb the hint afterwards.
    assert!(!controller.is_regular_verified());
    assert!(!controller.is_admin_verified());
    assert_eq!(controller.hint(), "Invalid");
}

#[test]
fn test_consumption_is_exclusive_under_contention() {
    // Many threads race to consume one grant; exactly one may win per swipe.
    let store = Arc::new(MemoryStore::new());
    let config = KioskConfig::custom(Duration::from_secs(5), Duration::from_secs(60));
    let controller = AccessController::new(store, config);

    for _ in 0..20 {
        swipe(&controller, &scan('C'));
        assert!(controller.is_regular_verified());

        let mut handles = vec![];
        for _ in 0..CONCURRENCY_LEVEL {
            let controller = controller.clone();
            handles.push(thread::spawn(move || controller.check_regular_verified(true)));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1, "a grant authorizes exactly one consumption");
        assert!(!controller.is_regular_verified());
    }
}

#[test]
fn test_expiry_racing_consumption_never_resurrects() {
    // A consumer and the expiry timer race over the same grant; whichever
    // wins, the session must end exactly once and stay ended.
    let store = Arc::new(MemoryStore::new());
    let config = KioskConfig::custom(Duration::from_secs(5), Duration::from_millis(3));
    let controller = AccessController::new(store, config);

    for _ in 0..ITERATIONS_PER_THREAD {
        swipe(&controller, &scan('X'));
        thread::sleep(Duration::from_millis(3));
        let _ = controller.check_regular_verified(true);
        assert!(!controller.is_regular_verified());
    }
}

#[test]
fn test_concurrent_enrollment_against_shared_store() {
    // One accumulator per thread (interleaved characters through a shared
    // accumulator would mix two cards' scans), all writing the same store.
    let store = Arc::new(MemoryStore::new());

    let mut handles = vec![];
    for i in 0..8u8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let enrollment = AdminEnrollment::new(store, KioskConfig::default());
            let buffer = scan(char::from(b'A' + i));
            for c in buffer.chars() {
                enrollment.handle_new_admin(Key::Char(c));
            }
            enrollment.handle_new_admin(Key::Enter)
        }));
    }
    for handle in handles {
        assert!(handle.join().expect("thread panicked"));
    }

    for i in 0..8u8 {
        let id = CardId::from_scan(&scan(char::from(b'A' + i))).unwrap();
        assert!(store.is_admin(&id).unwrap());
    }
}

#[test]
fn test_vote_registration_under_concurrent_keystrokes() {
    // Keystroke noise from one thread while another registers votes: the
    // store may gain at most one vote per granted swipe and the core must
    // never deadlock.
    let store = Arc::new(MemoryStore::new());
    let config = KioskConfig::custom(Duration::from_secs(5), Duration::from_secs(60));
    let controller = AccessController::new(store.clone(), config);

    let noisy = controller.clone();
    let noise = thread::spawn(move || {
        for _ in 0..ITERATIONS_PER_THREAD {
            noisy.handle_event(Key::Submit);
            noisy.handle_event(Key::Cancel);
        }
    });

    for _ in 0..10 {
        swipe(&controller, &scan('V'));
        let _ = controller.register_vote();
    }
    noise.join().expect("thread panicked");

    let id = CardId::from_scan(&scan('V')).unwrap();
    assert!(store.has_voted(&id).unwrap());
    assert!(!controller.register_vote().unwrap());
}
