// Keyhook Hotkey Sequences
// Multi-step hotkey matcher with per-step entries, timeout and rollback

use std::sync::{Arc, Weak};
use std::time::Instant;

use indexmap::IndexSet;
use parking_lot::Mutex;

use super::{HotkeyCallback, HotkeyOptions, HotkeyCombinations, ParsedHotkey};
use crate::event::{EventType, KeyEvent};
use crate::listener::{spawn_callback, HookId, Listener};

struct SequenceState {
    index: usize,
    last_update: Instant,
    /// Events withheld since step 0, replayed on a miss
    buffer: Vec<KeyEvent>,
    step_entry: Option<HookId>,
    catch_misses: Option<HookId>,
    removed: bool,
}

/// A live multi-step hotkey such as `"ctrl+a, b"`.
///
/// Only the entries of the current step are installed. While past the
/// first step a blocking hook watches every event, and any key outside the
/// current step (or a stale timestamp) rolls the sequence back: withheld
/// events are replayed to the OS in their original order and the sequence
/// restarts at step 0.
///
/// Lock order: the sequence state is always locked before the listener's
/// engine lock, never the other way around.
pub struct Sequence {
    this: Weak<Sequence>,
    listener: Weak<Listener>,
    combinations: HotkeyCombinations,
    allowed: Vec<IndexSet<u16>>,
    callback: HotkeyCallback,
    options: HotkeyOptions,
    state: Mutex<SequenceState>,
}

impl Sequence {
    /// Build the sequence and install its first step
    pub fn start(
        listener: &Arc<Listener>,
        parsed: &ParsedHotkey,
        callback: HotkeyCallback,
        options: HotkeyOptions,
    ) -> Arc<Self> {
        let sequence = Arc::new_cyclic(|this| Sequence {
            this: this.clone(),
            listener: Arc::downgrade(listener),
            combinations: parsed.combinations(),
            allowed: (0..parsed.len()).map(|i| parsed.step_codes(i)).collect(),
            callback,
            options,
            state: Mutex::new(SequenceState {
                index: 0,
                last_update: Instant::now(),
                buffer: Vec::new(),
                step_entry: None,
                catch_misses: None,
                removed: false,
            }),
        });
        {
            let mut state = sequence.state.lock();
            sequence.set_index(&mut state, listener, 0);
        }
        sequence
    }

    /// Current step, for diagnostics
    pub fn index(&self) -> usize {
        self.state.lock().index
    }

    /// Number of withheld events waiting for the sequence to resolve
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    fn is_final(&self, index: usize) -> bool {
        index + 1 == self.combinations.len()
    }

    fn set_index(&self, state: &mut SequenceState, listener: &Listener, index: usize) {
        if let Some(id) = state.step_entry.take() {
            listener.remove(id);
        }

        if index == 0 {
            if let Some(id) = state.catch_misses.take() {
                listener.remove(id);
            }
        } else if state.catch_misses.is_none() {
            let this = self.this.clone();
            state.catch_misses = Some(listener.add_blocking_hook(Arc::new(move |event: &KeyEvent| {
                if let Some(sequence) = this.upgrade() {
                    sequence.catch_misses(event);
                }
                true
            })));
        }

        let this = self.this.clone();
        state.step_entry = Some(listener.add_hotkey_entry(
            self.combinations.step(index),
            self.options.suppress,
            Arc::new(move |event: &KeyEvent| match this.upgrade() {
                Some(sequence) => sequence.on_step(event, index),
                None => true,
            }),
        ));
        state.index = index;
        state.last_update = Instant::now();
        log::debug!("Hotkey sequence at step {}/{}", index + 1, self.combinations.len());
    }

    fn on_step(&self, event: &KeyEvent, index: usize) -> bool {
        let listener = match self.listener.upgrade() {
            Some(listener) => listener,
            None => return true,
        };
        let mut state = self.state.lock();
        if state.removed || state.index != index {
            return true;
        }

        if !self.is_final(index) {
            if self.options.suppress {
                self.buffer_withheld(&mut state, &listener, event);
                state.buffer.push(event.clone());
            }
            if event.event_type() == EventType::Up {
                self.set_index(&mut state, &listener, index + 1);
            }
            return false;
        }

        let trigger = self.options.trigger_edge();
        if event.event_type() == trigger {
            let callback = Arc::clone(&self.callback);
            spawn_callback(move || callback());
            state.buffer.clear();
            self.set_index(&mut state, &listener, 0);
            return false;
        }
        if event.event_type() == EventType::Down {
            if self.options.suppress {
                state.buffer.push(event.clone());
            }
            return false;
        }

        self.rollback(&mut state, &listener);
        true
    }

    /// Queue keys that are held but were never seen by the OS, such as a
    /// modifier withheld by the modifier machine, ahead of `event`.
    fn buffer_withheld(&self, state: &mut SequenceState, listener: &Listener, event: &KeyEvent) {
        for held in listener.withheld_events() {
            if held.scan_code() == event.scan_code() {
                continue;
            }
            let already_down = state
                .buffer
                .iter()
                .rev()
                .find(|buffered| buffered.scan_code() == held.scan_code())
                .is_some_and(|buffered| buffered.event_type() == EventType::Down);
            if !already_down {
                state.buffer.push(held);
            }
        }
    }

    fn catch_misses(&self, event: &KeyEvent) {
        let listener = match self.listener.upgrade() {
            Some(listener) => listener,
            None => return,
        };
        let mut state = self.state.lock();
        if state.removed || state.index == 0 {
            return;
        }

        let outside_step = event.event_type() == self.options.trigger_edge()
            && event
                .scan_code()
                .is_none_or(|code| !self.allowed[state.index].contains(&code));
        let timed_out = self.options.timeout > 0.0
            && state.last_update.elapsed().as_secs_f64() >= self.options.timeout;

        if outside_step || timed_out {
            log::debug!(
                "Hotkey sequence missed at step {} ({})",
                state.index + 1,
                if timed_out { "timeout" } else { "unexpected key" }
            );
            self.rollback(&mut state, &listener);
        }
    }

    /// Replay withheld events and restart at step 0
    fn rollback(&self, state: &mut SequenceState, listener: &Listener) {
        let mut left_down: IndexSet<u16> = IndexSet::new();
        for event in state.buffer.drain(..) {
            let code = match event.scan_code() {
                Some(code) => code,
                None => continue,
            };
            listener.emit_in_hook(event.event_type(), code);
            match event.event_type() {
                EventType::Down => {
                    left_down.insert(code);
                }
                EventType::Up => {
                    left_down.shift_remove(&code);
                }
            }
        }
        for code in left_down {
            if !listener.is_physically_pressed(code) {
                listener.emit_in_hook(EventType::Up, code);
            }
        }
        self.set_index(state, listener, 0);
    }

    /// Uninstall every entry; later events are ignored
    pub fn remove(&self, listener: &Listener) {
        let mut state = self.state.lock();
        state.removed = true;
        state.buffer.clear();
        if let Some(id) = state.step_entry.take() {
            listener.remove(id);
        }
        if let Some(id) = state.catch_misses.take() {
            listener.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VirtualBackend;
    use crate::hotkey::{parse_hotkey, HotkeySpec};
    use crate::settings::Settings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sequence(hotkey: &str, options: HotkeyOptions) -> (Arc<Listener>, Arc<Sequence>, Arc<AtomicUsize>) {
        let backend = Arc::new(VirtualBackend::new());
        let listener = Listener::new(backend, Settings::new());
        let parsed = parse_hotkey(listener.backend(), &HotkeySpec::from(hotkey)).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let sequence = Sequence::start(
            &listener,
            &parsed,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            options,
        );
        (listener, sequence, fired)
    }

    #[test]
    fn test_advances_on_release() {
        let (listener, sequence, _) = sequence("a, b", HotkeyOptions::default().suppress(true));
        assert!(!listener.on_event(KeyEvent::down(30, None)));
        assert_eq!(sequence.index(), 0);
        assert!(!listener.on_event(KeyEvent::up(30, None)));
        assert_eq!(sequence.index(), 1);
        assert_eq!(sequence.buffered(), 2);
    }

    #[test]
    fn test_unexpected_key_rolls_back() {
        let (listener, sequence, _) = sequence("a, b", HotkeyOptions::default().suppress(true));
        listener.on_event(KeyEvent::down(30, None));
        listener.on_event(KeyEvent::up(30, None));
        assert!(listener.on_event(KeyEvent::down(46, None)));
        assert_eq!(sequence.index(), 0);
        assert_eq!(sequence.buffered(), 0);
        // Two entries back to one: catch-misses is gone.
        assert_eq!(listener.entry_count(), 1);
    }

    #[test]
    fn test_final_step_resets() {
        let (listener, sequence, _) = sequence("a, b", HotkeyOptions::default().suppress(true));
        listener.on_event(KeyEvent::down(30, None));
        listener.on_event(KeyEvent::up(30, None));
        assert!(!listener.on_event(KeyEvent::down(48, None)));
        assert_eq!(sequence.index(), 0);
        assert_eq!(sequence.buffered(), 0);
    }

    #[test]
    fn test_remove_uninstalls_everything() {
        let (listener, sequence, _) = sequence("a, b", HotkeyOptions::default().suppress(true));
        listener.on_event(KeyEvent::down(30, None));
        listener.on_event(KeyEvent::up(30, None));
        assert_eq!(listener.entry_count(), 2);
        sequence.remove(&listener);
        assert_eq!(listener.entry_count(), 0);
        assert!(listener.on_event(KeyEvent::down(48, None)));
    }
}
