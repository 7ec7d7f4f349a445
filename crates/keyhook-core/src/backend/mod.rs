// Keyhook Platform Backends
// Capability interface implemented once per OS and injected into the listener

#[cfg(all(feature = "evdev-backend", target_os = "linux"))]
pub mod evdev;
pub mod virtual_device;

use std::sync::Arc;

use crate::event::KeyEvent;

#[cfg(all(feature = "evdev-backend", target_os = "linux"))]
pub use self::evdev::{EvdevBackend, EvdevOptions};
pub use virtual_device::{OsEvent, VirtualBackend};

/// Callback invoked by a backend for every raw event.
///
/// Returning `false` asks the backend to withhold the physical event from
/// the rest of the system, where the platform supports it.
pub type EventCallback = Arc<dyn Fn(KeyEvent) -> bool + Send + Sync>;

/// One physical encoding of a key name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    pub scan_code: u16,
    /// Modifier names that must be held to produce the name (e.g. "shift" for "!")
    pub modifiers: Vec<String>,
}

/// Errors raised by platform backends
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("Key {0:?} is not mapped on this platform")]
    Unmapped(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform keyboard access.
///
/// `listen` blocks the calling thread for the lifetime of the hook, so the
/// listener always runs it on a dedicated thread. The callback it receives
/// must be answered quickly; some platforms silently drop hooks that stall.
pub trait Backend: Send + Sync {
    /// Prepare OS resources. Fails when permissions are insufficient.
    fn init(&self) -> Result<(), BackendError>;

    /// Deliver every raw event to `callback` until [`Backend::stop`] is called.
    fn listen(&self, callback: EventCallback) -> Result<(), BackendError>;

    /// Synthesize a hardware-equivalent key press
    fn press(&self, scan_code: u16) -> Result<(), BackendError>;

    /// Synthesize a hardware-equivalent key release
    fn release(&self, scan_code: u16) -> Result<(), BackendError>;

    /// Resolve a normalized key name to its physical encodings, preferred first
    fn map_name(&self, name: &str) -> Result<Vec<KeyMapping>, BackendError>;

    /// Type a character that may not exist on the current layout
    fn type_unicode(&self, character: char) -> Result<(), BackendError>;

    /// Best-effort name for a scan code, used when labelling synthetic events
    fn name_for(&self, _scan_code: u16) -> Option<String> {
        None
    }

    /// Make a running `listen` call return
    fn stop(&self) {}
}
