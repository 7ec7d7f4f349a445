// Keyhook Hotkeys
// Parsing, naming and live registration of single and multi-step hotkeys

pub mod name;
pub mod parser;
pub mod sequence;

use std::sync::{Arc, Weak};

use crate::error::{KeyhookError, KeyhookResult};
use crate::event::{EventType, KeyEvent};
use crate::listener::{spawn_callback, HookFn, HookId, Listener};

pub use name::get_hotkey_name;
pub use parser::{
    is_modifier, is_modifier_code, key_to_scan_codes, lookup_key, parse_hotkey,
    parse_hotkey_combinations, HotkeyCombinations, HotkeySpec, KeyCodes, KeyLookup, KeySpec,
    ParsedHotkey,
};
pub use sequence::Sequence;

/// Callback run, on its own thread, each time a hotkey fires
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

/// How a hotkey reacts to input.
#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyOptions {
    /// Withhold the hotkey's keys from other applications when it matches
    pub suppress: bool,
    /// Maximum seconds between steps of a multi-step hotkey; zero disables it
    pub timeout: f64,
    /// Fire when the last key is released instead of pressed
    pub trigger_on_release: bool,
}

impl Default for HotkeyOptions {
    fn default() -> Self {
        Self {
            suppress: false,
            timeout: 1.0,
            trigger_on_release: false,
        }
    }
}

impl HotkeyOptions {
    pub fn suppress(mut self, suppress: bool) -> Self {
        self.suppress = suppress;
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds.max(0.0);
        self
    }

    pub fn trigger_on_release(mut self, on_release: bool) -> Self {
        self.trigger_on_release = on_release;
        self
    }

    /// The edge that fires the callback
    pub fn trigger_edge(&self) -> EventType {
        if self.trigger_on_release {
            EventType::Up
        } else {
            EventType::Down
        }
    }
}

/// A hotkey registered with the listener.
pub enum ActiveHotkey {
    /// One step: a single dispatch entry
    Single(HookId),
    /// Several steps: entries come and go as the sequence advances
    Sequence(Arc<Sequence>),
}

impl ActiveHotkey {
    /// Register a hotkey with the listener.
    pub fn register(
        listener: &Arc<Listener>,
        hotkey: &HotkeySpec,
        callback: HotkeyCallback,
        options: HotkeyOptions,
    ) -> KeyhookResult<Self> {
        let parsed = parse_hotkey(listener.backend(), hotkey)?;
        if parsed.is_empty() {
            return Err(KeyhookError::MalformedHotkey(hotkey.to_string()));
        }
        let combinations = parsed.combinations();

        if !parsed.is_multi_step() {
            let handler = single_step_handler(Arc::downgrade(listener), callback, options.trigger_edge());
            let id = listener.add_hotkey_entry(combinations.step(0), options.suppress, handler);
            log::debug!("Registered hotkey {} (suppress: {})", hotkey, options.suppress);
            return Ok(ActiveHotkey::Single(id));
        }

        let sequence = Sequence::start(listener, &parsed, callback, options);
        log::debug!("Registered {}-step hotkey {}", parsed.len(), hotkey);
        Ok(ActiveHotkey::Sequence(sequence))
    }

    /// Remove every dispatch entry of the hotkey
    pub fn remove(&self, listener: &Listener) {
        match self {
            ActiveHotkey::Single(id) => {
                listener.remove(*id);
            }
            ActiveHotkey::Sequence(sequence) => sequence.remove(listener),
        }
    }
}

/// Entry for a one-step hotkey.
///
/// Fires on the trigger edge and suppresses it. Releases of keys the rest
/// of the system saw pressed are let through so nothing is left stuck.
fn single_step_handler(
    listener: Weak<Listener>,
    callback: HotkeyCallback,
    trigger: EventType,
) -> HookFn {
    Arc::new(move |event: &KeyEvent| {
        if event.event_type() == trigger {
            let callback = Arc::clone(&callback);
            spawn_callback(move || callback());
            return false;
        }
        if trigger == EventType::Down && event.event_type() == EventType::Up {
            return match (listener.upgrade(), event.scan_code()) {
                (Some(listener), Some(code)) => listener.is_logically_pressed(code),
                _ => true,
            };
        }
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = HotkeyOptions::default();
        assert!(!options.suppress);
        assert_eq!(options.timeout, 1.0);
        assert_eq!(options.trigger_edge(), EventType::Down);
        assert_eq!(options.trigger_on_release(true).trigger_edge(), EventType::Up);
    }

    #[test]
    fn test_negative_timeout_clamped() {
        assert_eq!(HotkeyOptions::default().timeout(-3.0).timeout, 0.0);
    }
}
