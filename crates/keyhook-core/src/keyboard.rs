// Keyhook Keyboard
// Public handle owning the listener and every registration made through it

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::{KeyhookError, KeyhookResult};
use crate::event::{EventType, KeyEvent};
use crate::hotkey::{
    get_hotkey_name, is_modifier, key_to_scan_codes, parse_hotkey, ActiveHotkey, HotkeyOptions,
    HotkeySpec, KeyCodes, KeySpec, ParsedHotkey,
};
use crate::listener::{spawn_callback, HookFn, HookId, Listener, Mirror};
use crate::record::Recording;
use crate::send::WriteOptions;
use crate::settings::Settings;
use crate::wait::event_label;

/// Opaque token returned by every registration; pass it back to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookHandle(u64);

impl fmt::Display for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Hook,
    Hotkey,
    Word,
}

type Remover = Box<dyn FnOnce(&Listener) + Send>;

struct Registration {
    kind: Kind,
    remove: Remover,
}

/// Global keyboard hooks, hotkeys and synthetic input.
///
/// All state lives in this handle: dropping it (or calling
/// [`Keyboard::shutdown`]) stops the backend and releases every hook.
///
/// ```no_run
/// use std::sync::Arc;
/// use keyhook_core::{HotkeyOptions, Keyboard, VirtualBackend};
///
/// let keyboard = Keyboard::new(Arc::new(VirtualBackend::new()));
/// keyboard
///     .add_hotkey("ctrl+shift+a", || println!("pressed"), HotkeyOptions::default())
///     .unwrap();
/// ```
pub struct Keyboard {
    listener: Arc<Listener>,
    registry: Mutex<IndexMap<HookHandle, Registration>>,
    next_handle: AtomicU64,
    pub(crate) recording: Mutex<Option<Recording>>,
}

impl Keyboard {
    /// Create a keyboard over a backend, with default settings
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_settings(backend, Settings::new())
    }

    pub fn with_settings(backend: Arc<dyn Backend>, settings: Settings) -> Self {
        Self {
            listener: Listener::new(backend, settings),
            registry: Mutex::new(IndexMap::new()),
            next_handle: AtomicU64::new(1),
            recording: Mutex::new(None),
        }
    }

    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    pub fn settings(&self) -> &Settings {
        self.listener.settings()
    }

    /// Hotkey options using the configured timeout
    pub fn hotkey_options(&self) -> HotkeyOptions {
        HotkeyOptions::default().timeout(self.settings().hotkey_timeout())
    }

    /// Start listening. Registrations call this themselves.
    pub fn start(&self) -> KeyhookResult<()> {
        self.listener.start_if_necessary()
    }

    /// Remove every registration and stop the backend
    pub fn shutdown(&self) {
        self.unhook_all();
        self.recording.lock().take();
        self.listener.shutdown();
    }

    pub(crate) fn register(&self, kind: Kind, remove: Remover) -> HookHandle {
        let handle = HookHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.registry.lock().insert(handle, Registration { kind, remove });
        handle
    }

    fn register_ids(&self, kind: Kind, ids: Vec<HookId>) -> HookHandle {
        self.register(
            kind,
            Box::new(move |listener: &Listener| {
                for id in ids {
                    listener.remove(id);
                }
            }),
        )
    }

    fn remove_where(&self, filter: impl Fn(Kind) -> bool) {
        let removed: Vec<Registration> = {
            let mut registry = self.registry.lock();
            let handles: Vec<HookHandle> = registry
                .iter()
                .filter(|(_, registration)| filter(registration.kind))
                .map(|(handle, _)| *handle)
                .collect();
            handles
                .iter()
                .filter_map(|handle| registry.shift_remove(handle))
                .collect()
        };
        for registration in removed {
            (registration.remove)(&self.listener);
        }
    }

    /// Call `callback` for every event. Never affects suppression.
    pub fn hook<F>(&self, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.start()?;
        let id = self.listener.add_handler(Arc::new(move |event: &KeyEvent| {
            callback(event);
            true
        }));
        Ok(self.register_ids(Kind::Hook, vec![id]))
    }

    /// Call `callback` for every event, synchronously; returning false
    /// withholds the event from other applications.
    pub fn hook_blocking<F>(&self, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) -> bool + Send + Sync + 'static,
    {
        self.start()?;
        let id = self.listener.add_blocking_hook(Arc::new(callback));
        Ok(self.register_ids(Kind::Hook, vec![id]))
    }

    pub fn on_press<F>(&self, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.hook(move |event| {
            if event.event_type() == EventType::Down {
                callback(event)
            }
        })
    }

    pub fn on_release<F>(&self, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.hook(move |event| {
            if event.event_type() == EventType::Up {
                callback(event)
            }
        })
    }

    fn add_key_hooks(
        &self,
        key: &KeySpec,
        blocking: bool,
        hook: HookFn,
    ) -> KeyhookResult<HookHandle> {
        let codes = key_to_scan_codes(self.listener.backend(), key)?;
        self.start()?;
        let ids = codes
            .iter()
            .map(|code| self.listener.add_key_hook(*code, blocking, Arc::clone(&hook)))
            .collect();
        Ok(self.register_ids(Kind::Hook, ids))
    }

    /// Call `callback` for every event of one key
    pub fn hook_key<F>(&self, key: impl Into<KeySpec>, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.add_key_hooks(
            &key.into(),
            false,
            Arc::new(move |event: &KeyEvent| {
                callback(event);
                true
            }),
        )
    }

    /// Like [`Keyboard::hook_key`], deciding synchronously whether the event goes through
    pub fn hook_key_blocking<F>(&self, key: impl Into<KeySpec>, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) -> bool + Send + Sync + 'static,
    {
        self.add_key_hooks(&key.into(), true, Arc::new(callback))
    }

    pub fn on_press_key<F>(&self, key: impl Into<KeySpec>, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.hook_key(key, move |event| {
            if event.event_type() == EventType::Down {
                callback(event)
            }
        })
    }

    pub fn on_release_key<F>(&self, key: impl Into<KeySpec>, callback: F) -> KeyhookResult<HookHandle>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.hook_key(key, move |event| {
            if event.event_type() == EventType::Up {
                callback(event)
            }
        })
    }

    /// Withhold every event of a key
    pub fn block_key(&self, key: impl Into<KeySpec>) -> KeyhookResult<HookHandle> {
        self.hook_key_blocking(key, |_| false)
    }

    /// Replace a key with another key or combination
    pub fn remap_key(&self, src: impl Into<KeySpec>, dst: impl Into<HotkeySpec>) -> KeyhookResult<HookHandle> {
        let dst = dst.into();
        parse_hotkey(self.listener.backend(), &dst)?;
        let listener = Arc::downgrade(&self.listener);
        self.hook_key_blocking(src, move |event| {
            if let Some(listener) = listener.upgrade() {
                let result = match event.event_type() {
                    EventType::Down => listener.press(&dst),
                    EventType::Up => listener.release(&dst),
                };
                if let Err(e) = result {
                    log::warn!("Failed to remap to {}: {}", dst, e);
                }
            }
            false
        })
    }

    /// Remove any registration. Returns false if it was already removed.
    pub fn unhook(&self, handle: HookHandle) -> bool {
        let removed = self.registry.lock().shift_remove(&handle);
        match removed {
            Some(registration) => {
                (registration.remove)(&self.listener);
                true
            }
            None => false,
        }
    }

    /// Remove every hook, key hook, hotkey and word listener
    pub fn unhook_all(&self) {
        self.remove_where(|_| true);
    }

    /// Invoke `callback` each time the hotkey is pressed.
    ///
    /// The hotkey is written like `"ctrl+shift+a, s"`: hold ctrl, shift and
    /// a, release, then press s. Literal `+` and `,` are spelled `plus` and
    /// `comma` inside combinations. The callback runs on its own thread.
    pub fn add_hotkey<F>(
        &self,
        hotkey: impl Into<HotkeySpec>,
        callback: F,
        options: HotkeyOptions,
    ) -> KeyhookResult<HookHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hotkey = hotkey.into();
        self.start()?;
        let active = ActiveHotkey::register(&self.listener, &hotkey, Arc::new(callback), options)?;
        Ok(self.register(
            Kind::Hotkey,
            Box::new(move |listener: &Listener| active.remove(listener)),
        ))
    }

    /// Remove a hotkey. Returns false for unknown or non-hotkey handles.
    pub fn remove_hotkey(&self, handle: HookHandle) -> bool {
        let is_hotkey = self
            .registry
            .lock()
            .get(&handle)
            .is_some_and(|registration| registration.kind == Kind::Hotkey);
        is_hotkey && self.unhook(handle)
    }

    /// Remove every hotkey, including the ones created by waits and remaps
    pub fn clear_all_hotkeys(&self) {
        self.remove_where(|kind| kind == Kind::Hotkey);
    }

    /// Make one hotkey send another instead.
    ///
    /// Modifiers held when the source fires are released around `dst` and
    /// pressed again afterwards.
    pub fn remap_hotkey(
        &self,
        src: impl Into<HotkeySpec>,
        dst: impl Into<HotkeySpec>,
        options: HotkeyOptions,
    ) -> KeyhookResult<HookHandle> {
        let dst = dst.into();
        parse_hotkey(self.listener.backend(), &dst)?;
        let listener: Weak<Listener> = Arc::downgrade(&self.listener);
        self.add_hotkey(
            src,
            move || {
                if let Some(listener) = listener.upgrade() {
                    if let Err(e) = remap_hotkey_once(&listener, &dst) {
                        log::warn!("Failed to send remapped hotkey {}: {}", dst, e);
                    }
                }
            },
            options.suppress(true),
        )
    }

    /// Send a hotkey: press every key, then release them in reverse
    pub fn send(&self, hotkey: impl Into<HotkeySpec>) -> KeyhookResult<()> {
        self.listener.send(&hotkey.into(), true, true)
    }

    pub fn send_with(&self, hotkey: impl Into<HotkeySpec>, do_press: bool, do_release: bool) -> KeyhookResult<()> {
        self.listener.send(&hotkey.into(), do_press, do_release)
    }

    pub fn press(&self, hotkey: impl Into<HotkeySpec>) -> KeyhookResult<()> {
        self.listener.press(&hotkey.into())
    }

    pub fn release(&self, hotkey: impl Into<HotkeySpec>) -> KeyhookResult<()> {
        self.listener.release(&hotkey.into())
    }

    /// Type text with the default options
    pub fn write(&self, text: &str) -> KeyhookResult<()> {
        self.listener.write(text, &WriteOptions::default())
    }

    pub fn write_with(&self, text: &str, options: &WriteOptions) -> KeyhookResult<()> {
        self.listener.write(text, options)
    }

    /// Whether every key of a combination is currently held
    pub fn is_pressed(&self, hotkey: impl Into<HotkeySpec>) -> KeyhookResult<bool> {
        let hotkey = hotkey.into();
        self.start()?;
        if let HotkeySpec::Code(code) = hotkey {
            return Ok(self.listener.is_physically_pressed(code));
        }
        let parsed = parse_hotkey(self.listener.backend(), &hotkey)?;
        if parsed.is_multi_step() {
            return Err(KeyhookError::MultiStepQuery(hotkey.to_string()));
        }
        let pressed = self.listener.pressed_codes();
        Ok(parsed.steps().iter().flatten().all(|alternatives| {
            alternatives.iter().any(|code| pressed.contains(code))
        }))
    }

    /// Release every held key, returning what was held
    pub fn stash_state(&self) -> KeyhookResult<Vec<u16>> {
        self.listener.stash_state()
    }

    pub fn restore_state(&self, scan_codes: &[u16]) -> KeyhookResult<()> {
        self.listener.restore_state(scan_codes)
    }

    pub fn restore_modifiers(&self, scan_codes: &[u16]) -> KeyhookResult<()> {
        self.listener.restore_modifiers(scan_codes)
    }

    /// Physically held scan codes, ascending
    pub fn pressed_scan_codes(&self) -> Vec<u16> {
        self.listener.pressed_codes()
    }

    /// Canonical name of the keys currently held
    pub fn current_hotkey_name(&self) -> String {
        get_hotkey_name(self.listener.pressed_events().iter().map(event_label))
    }

    /// Run `callback` on its own thread after `delay`
    pub fn call_later<F>(&self, callback: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        spawn_callback(move || {
            thread::sleep(delay);
            callback();
        });
    }

    pub fn is_modifier(&self, key: impl Into<KeySpec>) -> bool {
        is_modifier(self.listener.backend(), &key.into())
    }

    pub fn key_to_scan_codes(&self, key: impl Into<KeySpec>) -> KeyhookResult<KeyCodes> {
        key_to_scan_codes(self.listener.backend(), &key.into())
    }

    pub fn parse_hotkey(&self, hotkey: impl Into<HotkeySpec>) -> KeyhookResult<ParsedHotkey> {
        parse_hotkey(self.listener.backend(), &hotkey.into())
    }

    /// Number of live registrations
    pub fn registration_count(&self) -> usize {
        self.registry.lock().len()
    }
}

fn remap_hotkey_once(listener: &Listener, dst: &HotkeySpec) -> KeyhookResult<()> {
    let held = listener.allowed_modifiers();
    for code in &held {
        listener.emit(EventType::Up, *code, Mirror::Both)?;
    }
    listener.send(dst, true, true)?;
    for code in held.iter().rev() {
        listener.emit(EventType::Down, *code, Mirror::Both)?;
    }
    Ok(())
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
