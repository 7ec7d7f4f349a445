// Keyhook Output
// Synthetic key emission: hotkeys, single keys, text and pressed-state save/restore

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use crate::error::KeyhookResult;
use crate::event::EventType;
use crate::hotkey::parser::{parse_hotkey, HotkeySpec, KeySpec};
use crate::listener::{Listener, Mirror};
use crate::names::normalize_name;

/// Options for [`Listener::write`]
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Pause after each character; `None` uses the configured default
    pub delay: Option<Duration>,
    /// Press again the modifiers that were held before typing started
    pub restore_state_after: bool,
    /// Type every character through the unicode path; `None` uses the configured default
    pub exact: Option<bool>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            delay: None,
            restore_state_after: true,
            exact: None,
        }
    }
}

impl WriteOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = Some(exact);
        self
    }

    pub fn restore_state_after(mut self, restore: bool) -> Self {
        self.restore_state_after = restore;
        self
    }
}

impl Listener {
    /// Press every key of every step in order, then release them in reverse.
    ///
    /// Steps are sent one after the other: `"ctrl+a, b"` is a full ctrl+a
    /// tap followed by a tap of b.
    pub fn send(&self, hotkey: &HotkeySpec, do_press: bool, do_release: bool) -> KeyhookResult<()> {
        self.send_mirrored(hotkey, do_press, do_release, Mirror::Both)
    }

    pub(crate) fn send_mirrored(
        &self,
        hotkey: &HotkeySpec,
        do_press: bool,
        do_release: bool,
        mirror: Mirror,
    ) -> KeyhookResult<()> {
        let parsed = parse_hotkey(self.backend(), hotkey)?;
        let _guard = self.replay_guard();
        for keys in parsed.preferred_codes() {
            if do_press {
                for code in &keys {
                    self.emit(EventType::Down, *code, mirror)?;
                }
            }
            if do_release {
                for code in keys.iter().rev() {
                    self.emit(EventType::Up, *code, mirror)?;
                }
            }
        }
        Ok(())
    }

    pub fn press(&self, hotkey: &HotkeySpec) -> KeyhookResult<()> {
        self.send(hotkey, true, false)
    }

    pub fn release(&self, hotkey: &HotkeySpec) -> KeyhookResult<()> {
        self.send(hotkey, false, true)
    }

    /// Release every pressed key and return their scan codes, ascending
    pub fn stash_state(&self) -> KeyhookResult<Vec<u16>> {
        let codes = self.pressed_codes();
        for code in &codes {
            self.emit(EventType::Up, *code, Mirror::Both)?;
        }
        Ok(codes)
    }

    /// Press and release keys until exactly `codes` are held
    pub fn restore_state(&self, codes: &[u16]) -> KeyhookResult<()> {
        let target: BTreeSet<u16> = codes.iter().copied().collect();
        let current: BTreeSet<u16> = self.pressed_codes().into_iter().collect();
        for code in current.difference(&target) {
            self.emit(EventType::Up, *code, Mirror::Both)?;
        }
        for code in target.difference(&current) {
            self.emit(EventType::Down, *code, Mirror::Both)?;
        }
        Ok(())
    }

    /// Release held keys toward the OS only; the physical table keeps
    /// tracking the hardware. Returns the held scan codes, ascending.
    pub(crate) fn suspend_held(&self) -> KeyhookResult<Vec<u16>> {
        let codes = self.pressed_codes();
        for code in &codes {
            if self.is_logically_pressed(*code) {
                self.emit(EventType::Up, *code, Mirror::Logical)?;
            }
        }
        Ok(codes)
    }

    /// Press again the modifiers from `held` that are still physically down
    pub(crate) fn resume_modifiers(&self, held: &[u16]) -> KeyhookResult<()> {
        for code in held {
            if self.is_modifier_code(*code)
                && self.is_physically_pressed(*code)
                && !self.is_logically_pressed(*code)
            {
                self.emit(EventType::Down, *code, Mirror::Logical)?;
            }
        }
        Ok(())
    }

    /// Like [`Listener::restore_state`], restricted to modifiers
    pub fn restore_modifiers(&self, codes: &[u16]) -> KeyhookResult<()> {
        let modifiers: Vec<u16> = codes
            .iter()
            .copied()
            .filter(|code| self.is_modifier_code(*code))
            .collect();
        self.restore_state(&modifiers)
    }

    /// Type text, releasing held keys first.
    ///
    /// Output only touches the logical table, so keys held on the hardware
    /// still read as pressed during and after typing.
    ///
    /// Characters with a key on the current layout are typed as key presses
    /// with whatever modifiers they need; the rest go through the backend's
    /// unicode path. In exact mode everything except newline and backspace
    /// uses the unicode path.
    pub fn write(&self, text: &str, options: &WriteOptions) -> KeyhookResult<()> {
        let exact = options.exact.or(self.settings().exact_typing()).unwrap_or(false);
        let delay = options
            .delay
            .unwrap_or_else(|| Duration::from_secs_f64(self.settings().write_delay()));

        let held = self.suspend_held()?;
        log::debug!("Writing {} characters (exact: {})", text.chars().count(), exact);

        for character in text.chars() {
            if exact && matches!(character, '\n' | '\u{8}') {
                self.send_mirrored(&HotkeySpec::Text(character.to_string()), true, true, Mirror::Logical)?;
            } else if exact {
                let _guard = self.replay_guard();
                self.backend().type_unicode(character)?;
            } else {
                self.type_character(character)?;
            }
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        if options.restore_state_after {
            self.resume_modifiers(&held)?;
        }
        Ok(())
    }

    fn type_character(&self, character: char) -> KeyhookResult<()> {
        let name = normalize_name(&character.to_string());
        let mapping = self
            .backend()
            .map_name(&name)
            .ok()
            .and_then(|mappings| mappings.into_iter().next());

        let mapping = match mapping {
            Some(mapping) => mapping,
            None => {
                let _guard = self.replay_guard();
                self.backend().type_unicode(character)?;
                return Ok(());
            }
        };

        let modifiers: Vec<KeySpec> = mapping.modifiers.iter().map(KeySpec::from).collect();
        let modifiers = HotkeySpec::Keys(modifiers);
        let has_modifiers = !mapping.modifiers.is_empty();
        if has_modifiers {
            self.send_mirrored(&modifiers, true, false, Mirror::Logical)?;
        }
        self.emit(EventType::Down, mapping.scan_code, Mirror::Logical)?;
        self.emit(EventType::Up, mapping.scan_code, Mirror::Logical)?;
        if has_modifiers {
            self.send_mirrored(&modifiers, false, true, Mirror::Logical)?;
        }
        Ok(())
    }
}
