// Keyhook Virtual Backend
// In-memory backend for headless use and tests: events are injected by hand
// and everything the "OS" would receive is recorded in order

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Backend, BackendError, EventCallback, KeyMapping};
use crate::event::{EventType, KeyEvent};
use crate::layout;

/// How long `inject` waits for a listener to attach before giving up.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(2);

/// Something the virtual OS received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsEvent {
    /// A key event, either a physical one that was let through or a synthetic one
    Key {
        event_type: EventType,
        scan_code: u16,
        synthetic: bool,
    },
    /// A character typed through the unicode path
    Unicode(char),
}

impl OsEvent {
    pub fn scan_code(&self) -> Option<u16> {
        match self {
            OsEvent::Key { scan_code, .. } => Some(*scan_code),
            OsEvent::Unicode(_) => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, OsEvent::Key { synthetic: true, .. })
    }
}

#[derive(Default)]
struct VirtualState {
    callback: Option<EventCallback>,
    stopped: bool,
    init_error: Option<String>,
    init_calls: usize,
    output: Vec<OsEvent>,
}

/// Backend without any OS access.
///
/// `inject` plays the role of the hardware: it runs the listener's callback
/// on the calling thread and records the event as delivered when the
/// callback accepts it. Synthetic presses and releases are recorded as they
/// are issued, so the output log shows exactly what other applications
/// would have seen, in order.
pub struct VirtualBackend {
    state: Mutex<VirtualState>,
    changed: Condvar,
}

impl VirtualBackend {
    /// Create a backend that initializes successfully
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState::default()),
            changed: Condvar::new(),
        }
    }

    /// Create a backend whose `init` fails, as on a machine without permissions
    pub fn failing(reason: impl Into<String>) -> Self {
        let backend = Self::new();
        backend.state.lock().init_error = Some(reason.into());
        backend
    }

    /// Number of times `init` was called
    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }

    /// Whether a listener is currently attached
    pub fn is_listening(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    /// Feed a raw event through the attached listener.
    ///
    /// Returns the listener's decision. Without a listener the event is
    /// delivered unconditionally.
    pub fn inject(&self, event: KeyEvent) -> bool {
        let callback = {
            let mut state = self.state.lock();
            let deadline = Instant::now() + ATTACH_TIMEOUT;
            while state.callback.is_none() && !state.stopped && state.init_calls > 0 {
                if self.changed.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            state.callback.clone()
        };

        let accepted = match callback {
            Some(callback) => callback(event.clone()),
            None => true,
        };

        if accepted {
            if let Some(scan_code) = event.scan_code() {
                self.state.lock().output.push(OsEvent::Key {
                    event_type: event.event_type(),
                    scan_code,
                    synthetic: false,
                });
            }
        }
        accepted
    }

    /// Inject a key-down for a scan code, named from the default layout
    pub fn inject_down(&self, scan_code: u16) -> bool {
        self.inject(Self::physical(EventType::Down, scan_code))
    }

    /// Inject a key-up for a scan code, named from the default layout
    pub fn inject_up(&self, scan_code: u16) -> bool {
        self.inject(Self::physical(EventType::Up, scan_code))
    }

    /// Inject a full down/up tap, returning both decisions
    pub fn tap(&self, scan_code: u16) -> (bool, bool) {
        (self.inject_down(scan_code), self.inject_up(scan_code))
    }

    fn physical(event_type: EventType, scan_code: u16) -> KeyEvent {
        let (name, keypad) = layout::name_for(scan_code)
            .map(|(name, keypad)| (Some(name), keypad))
            .unwrap_or((None, false));
        KeyEvent::new(event_type, scan_code, name).with_keypad(keypad)
    }

    /// Everything delivered to the virtual OS so far
    pub fn output(&self) -> Vec<OsEvent> {
        self.state.lock().output.clone()
    }

    /// Drain the output log
    pub fn take_output(&self) -> Vec<OsEvent> {
        std::mem::take(&mut self.state.lock().output)
    }

    /// Only the synthetic key events, as (type, scan code) pairs
    pub fn synthetic_keys(&self) -> Vec<(EventType, u16)> {
        self.state
            .lock()
            .output
            .iter()
            .filter_map(|event| match event {
                OsEvent::Key {
                    event_type,
                    scan_code,
                    synthetic: true,
                } => Some((*event_type, *scan_code)),
                _ => None,
            })
            .collect()
    }

    fn record_synthetic(&self, event_type: EventType, scan_code: u16) {
        self.state.lock().output.push(OsEvent::Key {
            event_type,
            scan_code,
            synthetic: true,
        });
    }
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for VirtualBackend {
    fn init(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.init_calls += 1;
        match &state.init_error {
            Some(reason) => Err(BackendError::PermissionDenied(reason.clone())),
            None => Ok(()),
        }
    }

    fn listen(&self, callback: EventCallback) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.callback = Some(callback);
        self.changed.notify_all();
        while !state.stopped {
            self.changed.wait(&mut state);
        }
        state.callback = None;
        Ok(())
    }

    fn press(&self, scan_code: u16) -> Result<(), BackendError> {
        self.record_synthetic(EventType::Down, scan_code);
        Ok(())
    }

    fn release(&self, scan_code: u16) -> Result<(), BackendError> {
        self.record_synthetic(EventType::Up, scan_code);
        Ok(())
    }

    fn map_name(&self, name: &str) -> Result<Vec<KeyMapping>, BackendError> {
        let mappings = layout::lookup(name);
        if mappings.is_empty() {
            return Err(BackendError::Unmapped(name.to_string()));
        }
        Ok(mappings)
    }

    fn type_unicode(&self, character: char) -> Result<(), BackendError> {
        self.state.lock().output.push(OsEvent::Unicode(character));
        Ok(())
    }

    fn name_for(&self, scan_code: u16) -> Option<String> {
        layout::name_for(scan_code).map(|(name, _)| name.to_string())
    }

    fn stop(&self) {
        self.state.lock().stopped = true;
        self.changed.notify_all();
    }
}
