// Keyhook Pressed-Key State
// Physical and logical pressed tables keyed by scan code

use smallvec::SmallVec;
use std::collections::HashMap;

use crate::event::{EventType, KeyEvent};

/// Sorted, deduplicated set of scan codes identifying a key combination.
pub type Signature = SmallVec<[u16; 8]>;

/// Build a signature from any set of scan codes
pub fn signature_of(codes: impl IntoIterator<Item = u16>) -> Signature {
    let mut signature: Signature = codes.into_iter().collect();
    signature.sort_unstable();
    signature.dedup();
    signature
}

/// Both views of which keys are down.
///
/// The physical table follows the hardware (and synthetic emissions made
/// through the public API). The logical table only holds keys the rest of
/// the system has actually seen pressed, so a suppressed key is physically
/// but not logically pressed.
#[derive(Debug, Default)]
pub struct PressedKeys {
    physical: HashMap<u16, KeyEvent>,
    logical: HashMap<u16, KeyEvent>,
}

impl PressedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event in the physical table
    pub fn apply_physical(&mut self, code: u16, event: &KeyEvent) {
        match event.event_type() {
            EventType::Down => {
                self.physical.insert(code, event.clone());
            }
            EventType::Up => {
                self.physical.remove(&code);
            }
        }
    }

    /// Record an event in the logical table
    pub fn apply_logical(&mut self, code: u16, event: &KeyEvent) {
        match event.event_type() {
            EventType::Down => {
                self.logical.insert(code, event.clone());
            }
            EventType::Up => {
                self.logical.remove(&code);
            }
        }
    }

    /// Record an event in both tables
    pub fn apply_both(&mut self, code: u16, event: &KeyEvent) {
        self.apply_physical(code, event);
        self.apply_logical(code, event);
    }

    pub fn is_physically_pressed(&self, code: u16) -> bool {
        self.physical.contains_key(&code)
    }

    pub fn is_logically_pressed(&self, code: u16) -> bool {
        self.logical.contains_key(&code)
    }

    /// Physically pressed scan codes, ascending
    pub fn physical_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.physical.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Logically pressed scan codes, ascending
    pub fn logical_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.logical.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Most recent physical event for each held key, oldest first
    pub fn physical_events(&self) -> Vec<KeyEvent> {
        let mut events: Vec<KeyEvent> = self.physical.values().cloned().collect();
        events.sort_by(|a, b| a.time().total_cmp(&b.time()));
        events
    }

    /// Signature of the current physical state
    pub fn signature(&self) -> Signature {
        signature_of(self.physical.keys().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.physical.is_empty() && self.logical.is_empty()
    }

    pub fn clear(&mut self) {
        self.physical.clear();
        self.logical.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_sorted_and_unique() {
        let signature = signature_of([30, 29, 30, 42]);
        assert_eq!(signature.as_slice(), &[29, 30, 42]);
    }

    #[test]
    fn test_physical_and_logical_diverge() {
        let mut keys = PressedKeys::new();
        let down = KeyEvent::down(30, Some("a"));
        keys.apply_physical(30, &down);

        assert!(keys.is_physically_pressed(30));
        assert!(!keys.is_logically_pressed(30));

        keys.apply_logical(30, &down);
        assert!(keys.is_logically_pressed(30));

        let up = KeyEvent::up(30, Some("a"));
        keys.apply_both(30, &up);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_signature_tracks_physical() {
        let mut keys = PressedKeys::new();
        keys.apply_physical(46, &KeyEvent::down(46, Some("c")));
        keys.apply_physical(29, &KeyEvent::down(29, Some("left ctrl")));
        assert_eq!(keys.signature().as_slice(), &[29, 46]);
        assert_eq!(keys.physical_codes(), vec![29, 46]);
        assert!(keys.logical_codes().is_empty());
    }

    #[test]
    fn test_physical_events_oldest_first() {
        let mut keys = PressedKeys::new();
        keys.apply_physical(42, &KeyEvent::down(42, None).with_time(2.0));
        keys.apply_physical(29, &KeyEvent::down(29, None).with_time(1.0));
        let codes: Vec<_> = keys.physical_events().iter().filter_map(|e| e.scan_code()).collect();
        assert_eq!(codes, vec![29, 42]);
    }
}
