// Keyhook Errors
// Error taxonomy shared by the public API

use crate::backend::BackendError;
use crate::settings::SettingsError;

/// Result type for keyhook operations
pub type KeyhookResult<T> = Result<T, KeyhookError>;

/// Errors reported to callers of the public API
///
/// Configuration errors (unknown keys, malformed hotkeys) are reported at
/// registration or query time. Backend errors surface the first time the
/// listener is started.
#[derive(Debug, thiserror::Error)]
pub enum KeyhookError {
    #[error("Key {key:?} is not mapped to any known key: {reason}")]
    UnmappedKey { key: String, reason: String },

    #[error("Malformed hotkey {0:?}")]
    MalformedHotkey(String),

    #[error("Impossible to check if multi-step hotkeys are pressed (`a+b` is ok, `a, b` isn't): {0:?}")]
    MultiStepQuery(String),

    #[error("Invalid key event: {0}")]
    InvalidEvent(String),

    #[error("Must call start_recording before stop_recording")]
    NotRecording,

    #[error("Listener is unavailable: {0}")]
    ListenerUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}
