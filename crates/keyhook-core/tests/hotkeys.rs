// Keyhook Hotkey Scenarios
//
// Single and multi-step hotkeys driven through the virtual backend: what
// fires, what is suppressed and what the OS ends up receiving.
//
// Run with: cargo test --test hotkeys

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use keyhook_core::{EventType, HotkeyOptions, Keyboard, OsEvent, VirtualBackend};

// =========================================================================
// Test Helpers
// =========================================================================

const CTRL: u16 = 29;
const A: u16 = 30;
const B: u16 = 48;
const C: u16 = 46;

fn keyboard() -> (Arc<VirtualBackend>, Keyboard) {
    let backend = Arc::new(VirtualBackend::new());
    (backend.clone(), Keyboard::new(backend))
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

/// Poll until `condition` holds; callbacks run on their own threads
fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Key events the virtual OS received, physical and synthetic alike
fn os_keys(backend: &VirtualBackend) -> Vec<(EventType, u16)> {
    backend
        .output()
        .into_iter()
        .filter_map(|event| match event {
            OsEvent::Key {
                event_type,
                scan_code,
                ..
            } => Some((event_type, scan_code)),
            OsEvent::Unicode(_) => None,
        })
        .collect()
}

// =========================================================================
// Single-step hotkeys
// =========================================================================

#[test]
fn test_single_step_fires_once_per_press() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard.add_hotkey("ctrl+a", callback, HotkeyOptions::default()).unwrap();

    assert!(backend.inject_down(CTRL));
    backend.tap(A);
    backend.tap(A);
    assert!(backend.inject_up(CTRL));

    assert!(eventually(|| count.load(Ordering::SeqCst) == 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unsuppressed_hotkey_lets_everything_through() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard.add_hotkey("ctrl+a", callback, HotkeyOptions::default()).unwrap();

    assert!(backend.inject_down(CTRL));
    assert_eq!(backend.tap(A), (true, true));
    assert!(backend.inject_up(CTRL));
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_suppressed_hotkey_hides_its_keys() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey("ctrl+a", callback, HotkeyOptions::default().suppress(true))
        .unwrap();

    assert!(!backend.inject_down(CTRL));
    assert!(!backend.inject_down(A));
    assert!(!backend.inject_up(A));
    assert!(!backend.inject_up(CTRL));

    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
    assert!(os_keys(&backend).is_empty());
    assert!(keyboard.listener().logically_pressed_codes().is_empty());
}

#[test]
fn test_lone_modifier_tap_is_replayed() {
    let (backend, keyboard) = keyboard();
    keyboard
        .add_hotkey("ctrl+a", || {}, HotkeyOptions::default().suppress(true))
        .unwrap();

    assert!(!backend.inject_down(CTRL));
    assert!(backend.inject_up(CTRL));
    assert_eq!(os_keys(&backend), vec![(EventType::Down, CTRL), (EventType::Up, CTRL)]);
}

#[test]
fn test_modifier_released_for_other_combination() {
    let (backend, keyboard) = keyboard();
    keyboard
        .add_hotkey("ctrl+a", || {}, HotkeyOptions::default().suppress(true))
        .unwrap();

    assert!(!backend.inject_down(CTRL));
    assert!(backend.inject_down(C));
    assert!(backend.inject_up(C));
    assert!(backend.inject_up(CTRL));
    assert_eq!(
        os_keys(&backend),
        vec![
            (EventType::Down, CTRL),
            (EventType::Down, C),
            (EventType::Up, C),
            (EventType::Up, CTRL),
        ]
    );
}

#[test]
fn test_trigger_on_release() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey(
            "a",
            callback,
            HotkeyOptions::default().suppress(true).trigger_on_release(true),
        )
        .unwrap();

    assert!(!backend.inject_down(A));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(!backend.inject_up(A));
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_removed_hotkey_no_longer_fires() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    let handle = keyboard
        .add_hotkey("a", callback, HotkeyOptions::default().suppress(true))
        .unwrap();
    assert!(keyboard.remove_hotkey(handle));
    assert!(!keyboard.remove_hotkey(handle));

    assert_eq!(backend.tap(A), (true, true));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_scan_code_hotkey() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard.add_hotkey(57u16, callback, HotkeyOptions::default()).unwrap();
    backend.tap(57);
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
}

// =========================================================================
// Multi-step hotkeys
// =========================================================================

#[test]
fn test_two_step_hotkey_fires() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey("ctrl+a, b", callback, HotkeyOptions::default().suppress(true))
        .unwrap();

    backend.inject_down(CTRL);
    backend.tap(A);
    backend.inject_up(CTRL);
    assert!(!backend.inject_down(B));
    backend.inject_up(B);

    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
    // Nothing of the matched sequence was replayed.
    assert!(backend.synthetic_keys().is_empty());
}

#[test]
fn test_two_step_mismatch_replays_in_order() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey("ctrl+a, b", callback, HotkeyOptions::default().suppress(true))
        .unwrap();

    backend.inject_down(CTRL);
    backend.tap(A);
    backend.inject_up(CTRL);
    assert!(backend.inject_down(C));
    assert!(backend.inject_up(C));

    assert_eq!(
        os_keys(&backend),
        vec![
            (EventType::Down, CTRL),
            (EventType::Down, A),
            (EventType::Up, A),
            (EventType::Up, CTRL),
            (EventType::Down, C),
            (EventType::Up, C),
        ]
    );
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(keyboard.listener().logically_pressed_codes().is_empty());
}

#[test]
fn test_two_step_timeout() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey(
            "a, b",
            callback,
            HotkeyOptions::default().suppress(true).timeout(0.1),
        )
        .unwrap();

    backend.tap(A);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(backend.tap(B), (true, true));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(
        os_keys(&backend),
        vec![
            (EventType::Down, A),
            (EventType::Up, A),
            (EventType::Down, B),
            (EventType::Up, B),
        ]
    );
}

#[test]
fn test_two_step_within_timeout() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey(
            "a, b",
            callback,
            HotkeyOptions::default().suppress(true).timeout(1.0),
        )
        .unwrap();

    backend.tap(A);
    thread::sleep(Duration::from_millis(50));
    backend.tap(B);
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_sequence_fires_repeatedly() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey("a, b", callback, HotkeyOptions::default().suppress(true))
        .unwrap();

    for _ in 0..3 {
        backend.tap(A);
        backend.tap(B);
    }
    assert!(eventually(|| count.load(Ordering::SeqCst) == 3));
}

#[test]
fn test_unsuppressed_sequence() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard.add_hotkey("a, b", callback, HotkeyOptions::default()).unwrap();

    assert_eq!(backend.tap(A), (true, true));
    // Non-blocking step entries advance on the dispatch worker.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(backend.tap(B), (true, true));
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_clear_all_hotkeys_removes_pending_sequence() {
    let (backend, keyboard) = keyboard();
    let (count, callback) = counter();
    keyboard
        .add_hotkey("a, b", callback, HotkeyOptions::default().suppress(true))
        .unwrap();
    backend.tap(A);
    keyboard.clear_all_hotkeys();
    assert_eq!(keyboard.listener().entry_count(), 0);

    assert_eq!(backend.tap(B), (true, true));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

// =========================================================================
// Remapping
// =========================================================================

#[test]
fn test_remap_hotkey_sends_destination() {
    let (backend, keyboard) = keyboard();
    keyboard
        .remap_hotkey("a", "b", keyboard.hotkey_options())
        .unwrap();

    assert!(!backend.inject_down(A));
    assert!(eventually(|| backend
        .synthetic_keys()
        .contains(&(EventType::Up, B))));
    assert!(!backend.inject_up(A));
}
