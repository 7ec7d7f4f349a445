// Keyhook Hotkey Parser
// Parses hotkey strings like "ctrl+shift+a, b" into steps of alternative scan codes

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use smallvec::SmallVec;

use crate::backend::Backend;
use crate::error::{KeyhookError, KeyhookResult};
use crate::names::{is_modifier_name, normalize_name, ALL_MODIFIERS, SIDED_MODIFIERS};
use crate::state::{signature_of, Signature};

/// Alternative scan codes for one key, preferred first.
pub type KeyCodes = SmallVec<[u16; 4]>;

static STEP_SEPARATOR: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r",\s?"));
static KEY_SEPARATOR: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\s?\+\s?"));

fn separator(re: &'static LazyLock<Result<Regex, regex::Error>>) -> KeyhookResult<&'static Regex> {
    re.as_ref()
        .map_err(|e| KeyhookError::MalformedHotkey(e.to_string()))
}

/// A single key, by scan code or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySpec {
    Code(u16),
    Name(String),
}

impl From<u16> for KeySpec {
    fn from(code: u16) -> Self {
        KeySpec::Code(code)
    }
}

impl From<&str> for KeySpec {
    fn from(name: &str) -> Self {
        KeySpec::Name(name.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(name: String) -> Self {
        KeySpec::Name(name)
    }
}

impl From<&String> for KeySpec {
    fn from(name: &String) -> Self {
        KeySpec::Name(name.clone())
    }
}

impl std::fmt::Display for KeySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySpec::Code(code) => write!(f, "{}", code),
            KeySpec::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// Anything accepted where a hotkey is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HotkeySpec {
    /// A bare scan code
    Code(u16),
    /// Text such as `"ctrl+a, b"`
    Text(String),
    /// Keys pressed together, as a single step
    Keys(Vec<KeySpec>),
}

impl From<u16> for HotkeySpec {
    fn from(code: u16) -> Self {
        HotkeySpec::Code(code)
    }
}

impl From<&str> for HotkeySpec {
    fn from(text: &str) -> Self {
        HotkeySpec::Text(text.to_string())
    }
}

impl From<String> for HotkeySpec {
    fn from(text: String) -> Self {
        HotkeySpec::Text(text)
    }
}

impl From<&String> for HotkeySpec {
    fn from(text: &String) -> Self {
        HotkeySpec::Text(text.clone())
    }
}

impl From<Vec<KeySpec>> for HotkeySpec {
    fn from(keys: Vec<KeySpec>) -> Self {
        HotkeySpec::Keys(keys)
    }
}

impl From<&[&str]> for HotkeySpec {
    fn from(keys: &[&str]) -> Self {
        HotkeySpec::Keys(keys.iter().map(|k| KeySpec::from(*k)).collect())
    }
}

impl<const N: usize> From<[&str; N]> for HotkeySpec {
    fn from(keys: [&str; N]) -> Self {
        HotkeySpec::Keys(keys.iter().map(|k| KeySpec::from(*k)).collect())
    }
}

impl std::fmt::Display for HotkeySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotkeySpec::Code(code) => write!(f, "{}", code),
            HotkeySpec::Text(text) => write!(f, "{}", text),
            HotkeySpec::Keys(keys) => {
                let parts: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Result of a lenient key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    Found(KeyCodes),
    /// Nothing produces this key; carries the backend's diagnostic
    NotFound(String),
}

impl KeyLookup {
    pub fn codes(&self) -> &[u16] {
        match self {
            KeyLookup::Found(codes) => codes,
            KeyLookup::NotFound(_) => &[],
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, KeyLookup::Found(_))
    }
}

/// Resolve a key to scan codes without failing.
pub fn lookup_key(backend: &dyn Backend, key: &KeySpec) -> KeyLookup {
    let name = match key {
        KeySpec::Code(code) => return KeyLookup::Found(SmallVec::from_slice(&[*code])),
        KeySpec::Name(name) => normalize_name(name),
    };

    if SIDED_MODIFIERS.contains(&name.as_str()) {
        let mut codes: IndexSet<u16> = IndexSet::new();
        for side in ["left", "right"] {
            let sided = KeySpec::Name(format!("{} {}", side, name));
            codes.extend(lookup_key(backend, &sided).codes().iter().copied());
        }
        if codes.is_empty() {
            return KeyLookup::NotFound(format!("neither side of {:?} is mapped", name));
        }
        return KeyLookup::Found(codes.into_iter().collect());
    }

    match backend.map_name(&name) {
        Ok(mappings) => {
            let codes: IndexSet<u16> = mappings.iter().map(|m| m.scan_code).collect();
            if codes.is_empty() {
                KeyLookup::NotFound(format!("{:?} has no scan codes", name))
            } else {
                KeyLookup::Found(codes.into_iter().collect())
            }
        }
        Err(e) => KeyLookup::NotFound(e.to_string()),
    }
}

/// Resolve a key to its scan codes, preferred first.
pub fn key_to_scan_codes(backend: &dyn Backend, key: &KeySpec) -> KeyhookResult<KeyCodes> {
    match lookup_key(backend, key) {
        KeyLookup::Found(codes) => Ok(codes),
        KeyLookup::NotFound(reason) => Err(KeyhookError::UnmappedKey {
            key: key.to_string(),
            reason,
        }),
    }
}

/// Check whether a scan code produces any modifier
pub fn is_modifier_code(backend: &dyn Backend, code: u16) -> bool {
    ALL_MODIFIERS.iter().any(|name| {
        lookup_key(backend, &KeySpec::Name(name.to_string()))
            .codes()
            .contains(&code)
    })
}

/// Check whether a key, by name or scan code, is a modifier
pub fn is_modifier(backend: &dyn Backend, key: &KeySpec) -> bool {
    match key {
        KeySpec::Code(code) => is_modifier_code(backend, *code),
        KeySpec::Name(name) => is_modifier_name(&normalize_name(name)),
    }
}

/// A hotkey split into steps, each step a set of keys pressed together,
/// each key a list of alternative scan codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHotkey {
    steps: Vec<Vec<KeyCodes>>,
}

impl ParsedHotkey {
    pub fn steps(&self) -> &[Vec<KeyCodes>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_multi_step(&self) -> bool {
        self.steps.len() > 1
    }

    /// Every scan code that may appear in a step
    pub fn step_codes(&self, index: usize) -> IndexSet<u16> {
        self.steps
            .get(index)
            .map(|keys| keys.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Preferred scan code of every key, step by step
    pub fn preferred_codes(&self) -> Vec<Vec<u16>> {
        self.steps
            .iter()
            .map(|keys| keys.iter().filter_map(|codes| codes.first().copied()).collect())
            .collect()
    }

    /// Expand each step into every combination of alternatives
    pub fn combinations(&self) -> HotkeyCombinations {
        let steps = self
            .steps
            .iter()
            .map(|keys| {
                let mut partial: Vec<Vec<u16>> = vec![Vec::new()];
                for alternatives in keys {
                    partial = partial
                        .iter()
                        .flat_map(|prefix| {
                            alternatives.iter().map(move |code| {
                                let mut next = prefix.clone();
                                next.push(*code);
                                next
                            })
                        })
                        .collect();
                }
                partial.into_iter().map(signature_of).collect()
            })
            .collect();
        HotkeyCombinations { steps }
    }
}

/// Each step of a hotkey as the list of signatures that satisfy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyCombinations {
    steps: Vec<Vec<Signature>>,
}

impl HotkeyCombinations {
    pub fn steps(&self) -> &[Vec<Signature>] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> &[Signature] {
        self.steps.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn parse_keys<'a>(
    backend: &dyn Backend,
    keys: impl Iterator<Item = &'a str>,
    hotkey: &str,
) -> KeyhookResult<Vec<KeyCodes>> {
    keys.map(|key| {
        if key.is_empty() {
            return Err(KeyhookError::MalformedHotkey(format!(
                "empty key in hotkey {:?}",
                hotkey
            )));
        }
        key_to_scan_codes(backend, &KeySpec::from(key))
    })
    .collect()
}

/// Parse a hotkey into steps of keys of alternative scan codes.
///
/// Text is split into steps on `,` and into keys on `+`. A scan code or a
/// single character is always one step of one key, so `"+"` and `","` name
/// the keys themselves.
pub fn parse_hotkey(backend: &dyn Backend, spec: &HotkeySpec) -> KeyhookResult<ParsedHotkey> {
    let steps = match spec {
        HotkeySpec::Code(code) => vec![vec![SmallVec::from_slice(&[*code])]],
        HotkeySpec::Keys(keys) => {
            if keys.is_empty() {
                return Err(KeyhookError::MalformedHotkey("empty key list".to_string()));
            }
            let step = keys
                .iter()
                .map(|key| key_to_scan_codes(backend, key))
                .collect::<KeyhookResult<Vec<_>>>()?;
            vec![step]
        }
        HotkeySpec::Text(text) => {
            if text.is_empty() {
                return Err(KeyhookError::MalformedHotkey("empty hotkey".to_string()));
            }
            if text.chars().count() == 1 {
                vec![vec![key_to_scan_codes(backend, &KeySpec::from(text.as_str()))?]]
            } else {
                let key_separator = separator(&KEY_SEPARATOR)?;
                separator(&STEP_SEPARATOR)?
                    .split(text)
                    .map(|step| {
                        if step.is_empty() {
                            return Err(KeyhookError::MalformedHotkey(format!(
                                "empty step in hotkey {:?}",
                                text
                            )));
                        }
                        parse_keys(backend, key_separator.split(step), text)
                    })
                    .collect::<KeyhookResult<Vec<_>>>()?
            }
        }
    };

    log::trace!("Parsed hotkey {} into {:?}", spec, steps);
    Ok(ParsedHotkey { steps })
}

/// Parse a hotkey and expand every step into sorted signatures
pub fn parse_hotkey_combinations(
    backend: &dyn Backend,
    spec: &HotkeySpec,
) -> KeyhookResult<HotkeyCombinations> {
    Ok(parse_hotkey(backend, spec)?.combinations())
}
