// Keyhook Core Library
// Global keyboard hooks, hotkey matching, synthetic input and record/replay

pub mod backend;
pub mod error;
pub mod event;
pub mod hotkey;
pub mod keyboard;
pub mod layout;
pub mod listener;
pub mod modifier;
pub mod names;
pub mod record;
pub mod send;
pub mod settings;
pub mod state;
pub mod wait;
pub mod words;

pub use backend::{Backend, BackendError, EventCallback, KeyMapping, OsEvent, VirtualBackend};
#[cfg(all(feature = "evdev-backend", target_os = "linux"))]
pub use backend::{EvdevBackend, EvdevOptions};
pub use error::{KeyhookError, KeyhookResult};
pub use event::{monotonic_time, EventType, KeyEvent};
pub use hotkey::{
    get_hotkey_name, is_modifier, key_to_scan_codes, lookup_key, parse_hotkey,
    parse_hotkey_combinations, HotkeyCallback, HotkeyCombinations, HotkeyOptions, HotkeySpec,
    KeyCodes, KeyLookup, KeySpec, ParsedHotkey,
};
pub use keyboard::{HookHandle, Keyboard};
pub use listener::{Listener, ReplayGuard};
pub use modifier::{ModifierMachine, ModifierState, Origin, Transition};
pub use names::{is_modifier_name, normalize_name, ALL_MODIFIERS, SIDED_MODIFIERS};
pub use send::WriteOptions;
pub use settings::{Settings, SettingsError};
pub use state::{signature_of, PressedKeys, Signature};
pub use wait::{CancelToken, WaitOutcome};
pub use words::{get_typed_strings, TypedStrings, WordMatcher, WordOptions};
