// Keyhook Word Listener Tests
//
// Typed words and abbreviations, fed key by key through the virtual backend.
//
// Run with: cargo test --test words

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use keyhook_core::{EventType, Keyboard, OsEvent, VirtualBackend, WordOptions};

fn keyboard() -> (Arc<VirtualBackend>, Keyboard) {
    let backend = Arc::new(VirtualBackend::new());
    (backend.clone(), Keyboard::new(backend))
}

fn type_text(backend: &VirtualBackend, keyboard: &Keyboard, text: &str) {
    for c in text.chars() {
        let code = keyboard.key_to_scan_codes(c.to_string().as_str()).unwrap()[0];
        backend.tap(code);
    }
}

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

#[test]
fn test_word_listener_fires_after_space() {
    let (backend, keyboard) = keyboard();
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    keyboard
        .add_word_listener(
            "pet",
            move || {
                inner.fetch_add(1, Ordering::SeqCst);
            },
            keyboard.word_options(),
        )
        .unwrap();

    type_text(&backend, &keyboard, "pet ");
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));

    type_text(&backend, &keyboard, "carpet ");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_suffix_match_and_custom_trigger() {
    let (backend, keyboard) = keyboard();
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    keyboard
        .add_word_listener(
            "pet",
            move || {
                inner.fetch_add(1, Ordering::SeqCst);
            },
            WordOptions::default().match_suffix(true).triggers(["enter"]),
        )
        .unwrap();

    type_text(&backend, &keyboard, "carpet");
    backend.tap(28);
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_removed_word_listener() {
    let (backend, keyboard) = keyboard();
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    let handle = keyboard
        .add_word_listener(
            "pet",
            move || {
                inner.fetch_add(1, Ordering::SeqCst);
            },
            WordOptions::default(),
        )
        .unwrap();
    assert!(keyboard.remove_word_listener(handle));

    type_text(&backend, &keyboard, "pet ");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_abbreviation_erases_and_writes() {
    let (backend, keyboard) = keyboard();
    keyboard
        .add_abbreviation("tm", "™", WordOptions::default())
        .unwrap();

    type_text(&backend, &keyboard, "tm ");
    assert!(eventually(|| backend.output().contains(&OsEvent::Unicode('™'))));

    let backspaces = backend
        .synthetic_keys()
        .into_iter()
        .filter(|key| *key == (EventType::Down, 14))
        .count();
    assert_eq!(backspaces, 3);
}
