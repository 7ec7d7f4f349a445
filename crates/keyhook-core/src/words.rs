// Keyhook Words
// Typed-word listeners, abbreviations and reconstruction of typed text from events

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KeyhookError, KeyhookResult};
use crate::event::{EventType, KeyEvent};
use crate::keyboard::{HookHandle, Keyboard, Kind};
use crate::listener::{spawn_callback, Listener};
use crate::names::{is_modifier_name, normalize_name};
use crate::send::WriteOptions;

fn is_shift(name: &str) -> bool {
    matches!(name, "shift" | "left shift" | "right shift")
}

/// Options for [`Keyboard::add_word_listener`]
#[derive(Debug, Clone, PartialEq)]
pub struct WordOptions {
    /// Keys that end a word
    pub triggers: Vec<String>,
    /// Also fire when the typed text merely ends with the word
    pub match_suffix: bool,
    /// Seconds of inactivity after which the typed text is forgotten; zero disables it
    pub timeout: f64,
}

impl Default for WordOptions {
    fn default() -> Self {
        Self {
            triggers: vec!["space".to_string()],
            match_suffix: false,
            timeout: 2.0,
        }
    }
}

impl WordOptions {
    pub fn triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.triggers = triggers.into_iter().map(|t| normalize_name(t.as_ref())).collect();
        self
    }

    pub fn match_suffix(mut self, match_suffix: bool) -> Self {
        self.match_suffix = match_suffix;
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds.max(0.0);
        self
    }
}

/// Tracks what has been typed since the last word boundary.
#[derive(Debug, Clone)]
pub struct WordMatcher {
    word: String,
    options: WordOptions,
    typed: String,
    last_time: Option<f64>,
    shift: bool,
    caps_lock: bool,
}

impl WordMatcher {
    pub fn new(word: impl Into<String>, options: WordOptions) -> Self {
        Self {
            word: word.into(),
            options,
            typed: String::new(),
            last_time: None,
            shift: false,
            caps_lock: false,
        }
    }

    /// Text typed so far
    pub fn typed(&self) -> &str {
        &self.typed
    }

    /// Feed one event; returns true when a trigger completes the word
    pub fn feed(&mut self, event: &KeyEvent) -> bool {
        let name = match event.name() {
            Some(name) => name,
            None => return false,
        };

        if is_shift(name) {
            self.shift = event.event_type() == EventType::Down;
            return false;
        }
        if event.event_type() == EventType::Up {
            return false;
        }
        if name == "caps lock" {
            self.caps_lock = !self.caps_lock;
            return false;
        }
        if is_modifier_name(name) {
            return false;
        }

        if let Some(last) = self.last_time {
            if self.options.timeout > 0.0 && event.time() - last > self.options.timeout {
                self.typed.clear();
            }
        }
        self.last_time = Some(event.time());

        let matched = self.typed == self.word
            || (self.options.match_suffix && self.typed.ends_with(&self.word));
        if self.options.triggers.iter().any(|t| t == name) && matched {
            self.typed.clear();
            return true;
        }

        if name.chars().count() > 1 {
            self.typed.clear();
        } else if self.shift ^ self.caps_lock {
            self.typed.push_str(&name.to_uppercase());
        } else {
            self.typed.push_str(name);
        }
        false
    }
}

impl Keyboard {
    /// Word-listener options using the configured timeout
    pub fn word_options(&self) -> WordOptions {
        WordOptions::default().timeout(self.settings().word_timeout())
    }

    /// Invoke `callback` when `word` is typed followed by a trigger key.
    ///
    /// Typing is tracked across shift and caps lock; any other non-character
    /// key (arrows, enter, ...) starts over.
    pub fn add_word_listener<F>(
        &self,
        word: &str,
        callback: F,
        options: WordOptions,
    ) -> KeyhookResult<HookHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if word.is_empty() {
            return Err(KeyhookError::MalformedHotkey("empty word".to_string()));
        }
        self.start()?;
        let matcher = Mutex::new(WordMatcher::new(word, options));
        let callback = Arc::new(callback);
        let id = self.listener().add_handler(Arc::new(move |event: &KeyEvent| {
            if matcher.lock().feed(event) {
                let callback = Arc::clone(&callback);
                spawn_callback(move || callback());
            }
            true
        }));
        log::debug!("Registered word listener for {:?}", word);
        Ok(self.register(
            Kind::Word,
            Box::new(move |listener: &Listener| {
                listener.remove(id);
            }),
        ))
    }

    pub fn remove_word_listener(&self, handle: HookHandle) -> bool {
        self.unhook(handle)
    }

    /// Replace `source` with `replacement` as it is typed.
    ///
    /// When the trigger follows `source`, the typed word plus the trigger
    /// are erased with backspaces and the replacement is written.
    pub fn add_abbreviation(
        &self,
        source: &str,
        replacement: &str,
        options: WordOptions,
    ) -> KeyhookResult<HookHandle> {
        let text = format!("{}{}", "\u{8}".repeat(source.chars().count() + 1), replacement);
        let listener = Arc::downgrade(self.listener());
        self.add_word_listener(
            source,
            move || {
                if let Some(listener) = listener.upgrade() {
                    if let Err(e) = listener.write(&text, &WriteOptions::default()) {
                        log::warn!("Failed to expand abbreviation: {}", e);
                    }
                }
            },
            options,
        )
    }
}

/// Strings typed in a sequence of events, split at non-character keys.
///
/// Created by [`get_typed_strings`].
pub struct TypedStrings<I> {
    events: I,
    allow_backspace: bool,
    shift: bool,
    caps_lock: bool,
    current: String,
    finished: bool,
}

impl<'a, I> Iterator for TypedStrings<I>
where
    I: Iterator<Item = &'a KeyEvent>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        for event in self.events.by_ref() {
            let name = match event.name() {
                Some(name) => name,
                None => continue,
            };
            let down = event.event_type() == EventType::Down;

            if name.contains("shift") {
                self.shift = down;
            } else if name == "caps lock" && down {
                self.caps_lock = !self.caps_lock;
            } else if self.allow_backspace && name == "backspace" && down {
                self.current.pop();
            } else if down {
                let name = if name == "space" { " " } else { name };
                if name.chars().count() == 1 {
                    if self.shift ^ self.caps_lock {
                        self.current.push_str(&name.to_uppercase());
                    } else {
                        self.current.push_str(name);
                    }
                } else {
                    return Some(std::mem::take(&mut self.current));
                }
            }
        }
        self.finished = true;
        Some(std::mem::take(&mut self.current))
    }
}

/// Reconstruct the strings typed in a recording.
///
/// ```
/// use keyhook_core::{get_typed_strings, KeyEvent};
///
/// let events = [
///     KeyEvent::down(30, Some("a")),
///     KeyEvent::up(30, Some("a")),
///     KeyEvent::down(57, Some("space")),
///     KeyEvent::down(48, Some("b")),
///     KeyEvent::down(28, Some("enter")),
/// ];
/// let strings: Vec<String> = get_typed_strings(&events, true).collect();
/// assert_eq!(strings, vec!["a b", ""]);
/// ```
pub fn get_typed_strings<'a, I>(events: I, allow_backspace: bool) -> TypedStrings<I::IntoIter>
where
    I: IntoIterator<Item = &'a KeyEvent>,
{
    TypedStrings {
        events: events.into_iter(),
        allow_backspace,
        shift: false,
        caps_lock: false,
        current: String::new(),
        finished: false,
    }
}
