// Keyhook Listener
// Backend thread, synchronous accept/suppress callback and the dispatch tables

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::backend::{Backend, BackendError, EventCallback};
use crate::error::{KeyhookError, KeyhookResult};
use crate::event::{EventType, KeyEvent};
use crate::hotkey::parser::{lookup_key, KeySpec};
use crate::modifier::{ModifierMachine, ModifierState, Origin};
use crate::names::ALL_MODIFIERS;
use crate::settings::Settings;
use crate::state::{PressedKeys, Signature};

/// Internal identifier of a dispatch-table entry
pub type HookId = u64;

/// Every hook shares this shape. Non-blocking hooks have their result ignored.
pub type HookFn = Arc<dyn Fn(&KeyEvent) -> bool + Send + Sync>;

/// Which pressed tables a synthetic emission is mirrored into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    /// Public API emissions: the OS now considers the key held (or not)
    Both,
    /// Emissions made while deciding a physical event
    Logical,
}

/// Keeps the listener in replay mode while alive. Nests.
pub struct ReplayGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> ReplayGuard<'a> {
    fn new(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How an entry is reached when it has to be removed
enum Slot {
    Handler,
    Blocking,
    Key { code: u16, blocking: bool },
    Hotkey { signatures: Vec<Signature>, blocking: bool },
}

/// Everything guarded by the single engine lock
#[derive(Default)]
struct EngineState {
    keys: PressedKeys,
    modifiers: ModifierMachine,
    active_modifiers: BTreeSet<u16>,
    handlers: IndexMap<HookId, HookFn>,
    blocking_hooks: IndexMap<HookId, HookFn>,
    blocking_keys: HashMap<u16, IndexMap<HookId, HookFn>>,
    nonblocking_keys: HashMap<u16, IndexMap<HookId, HookFn>>,
    blocking_hotkeys: HashMap<Signature, IndexMap<HookId, HookFn>>,
    nonblocking_hotkeys: HashMap<Signature, IndexMap<HookId, HookFn>>,
    filtered_modifiers: HashMap<u16, usize>,
    slots: HashMap<HookId, Slot>,
}

fn snapshot<K: std::hash::Hash + Eq>(table: &HashMap<K, IndexMap<HookId, HookFn>>, key: &K) -> Vec<HookFn> {
    table
        .get(key)
        .map(|hooks| hooks.values().cloned().collect())
        .unwrap_or_default()
}

fn remove_from<K: std::hash::Hash + Eq>(table: &mut HashMap<K, IndexMap<HookId, HookFn>>, key: &K, id: HookId) {
    if let Some(hooks) = table.get_mut(key) {
        hooks.shift_remove(&id);
        if hooks.is_empty() {
            table.remove(key);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Failed(String),
    Stopped,
}

/// A processed event on its way to non-blocking subscribers
struct Delivery {
    event: KeyEvent,
    signature: Signature,
}

/// Run a hook, isolating panics
fn call_hook(hook: &HookFn, event: &KeyEvent, on_panic: bool) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| hook(event))) {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Hook panicked while handling {}", event);
            on_panic
        }
    }
}

/// Run a user callback on its own short-lived thread
pub(crate) fn spawn_callback(callback: impl FnOnce() + Send + 'static) {
    let spawned = thread::Builder::new()
        .name("keyhook-callback".to_string())
        .spawn(move || {
            if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                log::warn!("Hotkey callback panicked");
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to spawn callback thread: {}", e);
    }
}

/// The keyboard hook engine.
///
/// Owns the pressed-key tables, the modifier state machine and every
/// dispatch table. The backend calls [`Listener::on_event`] from its own
/// thread for each physical event; everything that does not influence the
/// accept/suppress decision is handed to the dispatch worker.
pub struct Listener {
    backend: Arc<dyn Backend>,
    settings: Settings,
    modifier_codes: HashSet<u16>,
    engine: Mutex<EngineState>,
    replaying: AtomicUsize,
    next_id: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    queue: Mutex<Option<Sender<Delivery>>>,
}

impl Listener {
    pub fn new(backend: Arc<dyn Backend>, settings: Settings) -> Arc<Self> {
        let modifier_codes = ALL_MODIFIERS
            .iter()
            .flat_map(|name| {
                lookup_key(backend.as_ref(), &KeySpec::Name(name.to_string()))
                    .codes()
                    .to_vec()
            })
            .collect();
        Arc::new(Self {
            backend,
            settings,
            modifier_codes,
            engine: Mutex::new(EngineState::default()),
            replaying: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            lifecycle: Mutex::new(Lifecycle::Idle),
            queue: Mutex::new(None),
        })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start the backend and dispatch threads once.
    ///
    /// The first call blocks until the backend reports whether it could
    /// initialize. A failure is returned to that caller; every later call
    /// reports the listener as unavailable without retrying.
    pub fn start_if_necessary(self: &Arc<Self>) -> KeyhookResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Failed(reason) => {
                return Err(KeyhookError::ListenerUnavailable(reason.clone()))
            }
            Lifecycle::Stopped => {
                return Err(KeyhookError::ListenerUnavailable(
                    "listener has been shut down".to_string(),
                ))
            }
            Lifecycle::Idle => {}
        }

        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        *self.queue.lock() = Some(queue_tx);

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let backend = Arc::clone(&self.backend);
        let weak = Arc::downgrade(self);
        thread::Builder::new()
            .name("keyhook-listen".to_string())
            .spawn(move || {
                if let Err(e) = backend.init() {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                let callback: EventCallback = Arc::new(move |event| match weak.upgrade() {
                    Some(listener) => listener.on_event(event),
                    None => true,
                });
                if let Err(e) = backend.listen(callback) {
                    log::error!("Keyboard listener stopped: {}", e);
                }
                log::debug!("Listener thread exiting");
            })
            .map_err(BackendError::Io)?;

        let started = match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(BackendError::Device(
                "listener thread exited during startup".to_string(),
            )),
        };
        if let Err(e) = started {
            log::error!("Failed to start keyboard listener: {}", e);
            *lifecycle = Lifecycle::Failed(e.to_string());
            *self.queue.lock() = None;
            return Err(e.into());
        }

        let weak = Arc::downgrade(self);
        let worker = thread::Builder::new()
            .name("keyhook-dispatch".to_string())
            .spawn(move || Self::dispatch_loop(weak, queue_rx));
        if let Err(e) = worker {
            self.backend.stop();
            *lifecycle = Lifecycle::Failed(e.to_string());
            *self.queue.lock() = None;
            return Err(BackendError::Io(e).into());
        }

        *lifecycle = Lifecycle::Running;
        log::debug!("Keyboard listener started");
        Ok(())
    }

    /// Stop the backend loop and close the delivery queue
    pub fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Running {
            self.backend.stop();
            log::debug!("Keyboard listener stopped");
        }
        *lifecycle = Lifecycle::Stopped;
        self.queue.lock().take();
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// True while synthetic events are being emitted
    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst) > 0
    }

    pub fn replay_guard(&self) -> ReplayGuard<'_> {
        ReplayGuard::new(&self.replaying)
    }

    fn dispatch_loop(listener: Weak<Listener>, queue: Receiver<Delivery>) {
        for delivery in queue.iter() {
            match listener.upgrade() {
                Some(listener) => listener.dispatch(&delivery),
                None => break,
            }
        }
        log::debug!("Dispatch worker exiting");
    }

    /// Serve non-blocking key hooks, hotkeys and handlers, in that order
    fn dispatch(&self, delivery: &Delivery) {
        let event = &delivery.event;
        let (key_hooks, hotkey_hooks, handlers) = {
            let engine = self.engine.lock();
            let key_hooks = event
                .scan_code()
                .map(|code| snapshot(&engine.nonblocking_keys, &code))
                .unwrap_or_default();
            let hotkey_hooks = snapshot(&engine.nonblocking_hotkeys, &delivery.signature);
            let handlers: Vec<HookFn> = engine.handlers.values().cloned().collect();
            (key_hooks, hotkey_hooks, handlers)
        };
        for hook in key_hooks.iter().chain(&hotkey_hooks).chain(&handlers) {
            call_hook(hook, event, true);
        }
    }

    fn deliver(&self, event: KeyEvent, signature: Signature) {
        if let Some(queue) = self.queue.lock().as_ref() {
            let _ = queue.send(Delivery { event, signature });
        }
    }

    /// Decide whether a physical event reaches the rest of the system.
    ///
    /// Called synchronously by the backend. Never runs user callbacks while
    /// holding the engine lock.
    pub fn on_event(&self, event: KeyEvent) -> bool {
        if self.is_replaying() {
            return true;
        }

        let blocking_hooks: Vec<HookFn> = self.engine.lock().blocking_hooks.values().cloned().collect();
        let mut accept = blocking_hooks.iter().all(|hook| call_hook(hook, &event, true));

        let code = match event.scan_code() {
            Some(code) => code,
            None => {
                self.deliver(event, Signature::new());
                return accept;
            }
        };
        let event_type = event.event_type();

        let (signature, key_hooks) = {
            let mut engine = self.engine.lock();
            let signature = match event_type {
                EventType::Down => {
                    if self.modifier_codes.contains(&code) {
                        engine.active_modifiers.insert(code);
                    }
                    engine.keys.apply_physical(code, &event);
                    engine.keys.signature()
                }
                EventType::Up => {
                    let signature = engine.keys.signature();
                    engine.active_modifiers.remove(&code);
                    engine.keys.apply_physical(code, &event);
                    signature
                }
            };
            (signature, snapshot(&engine.blocking_keys, &code))
        };

        if accept {
            accept = key_hooks.iter().all(|hook| call_hook(hook, &event, true));
        }
        if !accept {
            self.trace_decision(&event, &signature, accept);
            self.deliver(event, signature);
            return false;
        }

        let (hotkeys_active, filtered, hotkey_hooks) = {
            let engine = self.engine.lock();
            (
                !engine.blocking_hotkeys.is_empty(),
                engine.filtered_modifiers.get(&code).copied().unwrap_or(0) > 0,
                snapshot(&engine.blocking_hotkeys, &signature),
            )
        };

        let mut presses = Vec::new();
        if hotkeys_active {
            let origin = if filtered {
                Origin::Modifier
            } else {
                // Every handler sees the event, even after one rejects it.
                let results: Vec<bool> = hotkey_hooks
                    .iter()
                    .map(|hook| call_hook(hook, &event, true))
                    .collect();
                if results.is_empty() {
                    Origin::Other
                } else {
                    accept = results.into_iter().all(|r| r);
                    Origin::Hotkey
                }
            };

            let mut engine = self.engine.lock();
            let affected: BTreeSet<u16> = if origin == Origin::Modifier {
                BTreeSet::from([code])
            } else {
                let mut affected = engine.active_modifiers.clone();
                if self.modifier_codes.contains(&code) {
                    affected.insert(code);
                }
                affected
            };
            for modifier in affected {
                let step = engine.modifiers.apply(modifier, event_type, origin);
                if step.press && !engine.keys.is_logically_pressed(modifier) {
                    presses.push(modifier);
                }
                if let Some(decision) = step.accept {
                    accept = decision;
                }
            }
        }

        for modifier in presses {
            self.emit_in_hook(EventType::Down, modifier);
        }

        if accept {
            self.engine.lock().keys.apply_logical(code, &event);
        }

        self.trace_decision(&event, &signature, accept);
        self.deliver(event, signature);
        accept
    }

    fn trace_decision(&self, event: &KeyEvent, signature: &Signature, accept: bool) {
        if self.settings.debug_events() {
            log::trace!(
                "{} signature={:?} -> {}",
                event,
                signature.as_slice(),
                if accept { "accept" } else { "suppress" }
            );
        }
    }

    fn next_id(&self) -> HookId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Subscribe to every event after the decision; never affects suppression
    pub fn add_handler(&self, hook: HookFn) -> HookId {
        let id = self.next_id();
        let mut engine = self.engine.lock();
        engine.handlers.insert(id, hook);
        engine.slots.insert(id, Slot::Handler);
        id
    }

    /// Add a predicate every event must satisfy to be let through
    pub fn add_blocking_hook(&self, hook: HookFn) -> HookId {
        let id = self.next_id();
        let mut engine = self.engine.lock();
        engine.blocking_hooks.insert(id, hook);
        engine.slots.insert(id, Slot::Blocking);
        id
    }

    /// Hook a single scan code
    pub fn add_key_hook(&self, code: u16, blocking: bool, hook: HookFn) -> HookId {
        let id = self.next_id();
        let mut engine = self.engine.lock();
        let table = if blocking {
            &mut engine.blocking_keys
        } else {
            &mut engine.nonblocking_keys
        };
        table.entry(code).or_default().insert(id, hook);
        engine.slots.insert(id, Slot::Key { code, blocking });
        id
    }

    /// Register one handler under several signatures.
    ///
    /// Modifiers appearing in the signatures are counted as filtered so the
    /// modifier machine withholds them while a blocking hotkey is possible.
    pub fn add_hotkey_entry(&self, signatures: &[Signature], blocking: bool, hook: HookFn) -> HookId {
        let id = self.next_id();
        let mut engine = self.engine.lock();
        for signature in signatures {
            for code in signature {
                if self.modifier_codes.contains(code) {
                    *engine.filtered_modifiers.entry(*code).or_default() += 1;
                }
            }
            let table = if blocking {
                &mut engine.blocking_hotkeys
            } else {
                &mut engine.nonblocking_hotkeys
            };
            table.entry(signature.clone()).or_default().insert(id, Arc::clone(&hook));
        }
        engine.slots.insert(
            id,
            Slot::Hotkey {
                signatures: signatures.to_vec(),
                blocking,
            },
        );
        id
    }

    /// Remove any entry by id. Returns false if it was already gone.
    pub fn remove(&self, id: HookId) -> bool {
        let mut engine = self.engine.lock();
        let slot = match engine.slots.remove(&id) {
            Some(slot) => slot,
            None => return false,
        };
        match slot {
            Slot::Handler => {
                engine.handlers.shift_remove(&id);
            }
            Slot::Blocking => {
                engine.blocking_hooks.shift_remove(&id);
            }
            Slot::Key { code, blocking } => {
                let table = if blocking {
                    &mut engine.blocking_keys
                } else {
                    &mut engine.nonblocking_keys
                };
                remove_from(table, &code, id);
            }
            Slot::Hotkey { signatures, blocking } => {
                for signature in &signatures {
                    for code in signature {
                        if let Some(count) = engine.filtered_modifiers.get_mut(code) {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                engine.filtered_modifiers.remove(code);
                            }
                        }
                    }
                    let table = if blocking {
                        &mut engine.blocking_hotkeys
                    } else {
                        &mut engine.nonblocking_hotkeys
                    };
                    remove_from(table, signature, id);
                }
            }
        }
        true
    }

    /// Emit a synthetic key event under the replay guard
    pub fn emit(&self, event_type: EventType, code: u16, mirror: Mirror) -> Result<(), BackendError> {
        let _guard = self.replay_guard();
        match event_type {
            EventType::Down => self.backend.press(code)?,
            EventType::Up => self.backend.release(code)?,
        }
        let name = self.backend.name_for(code);
        let event = KeyEvent::new(event_type, code, name.as_deref());
        let mut engine = self.engine.lock();
        match mirror {
            Mirror::Both => engine.keys.apply_both(code, &event),
            Mirror::Logical => engine.keys.apply_logical(code, &event),
        }
        Ok(())
    }

    /// Emit from inside a decision; failures are logged, not propagated
    pub(crate) fn emit_in_hook(&self, event_type: EventType, code: u16) {
        if let Err(e) = self.emit(event_type, code, Mirror::Logical) {
            log::warn!("Failed to emit {} {}: {}", code, event_type, e);
        }
    }

    pub fn is_modifier_code(&self, code: u16) -> bool {
        self.modifier_codes.contains(&code)
    }

    pub fn is_physically_pressed(&self, code: u16) -> bool {
        self.engine.lock().keys.is_physically_pressed(code)
    }

    pub fn is_logically_pressed(&self, code: u16) -> bool {
        self.engine.lock().keys.is_logically_pressed(code)
    }

    /// Physically pressed scan codes, ascending
    pub fn pressed_codes(&self) -> Vec<u16> {
        self.engine.lock().keys.physical_codes()
    }

    /// Logically pressed scan codes, ascending
    pub fn logically_pressed_codes(&self) -> Vec<u16> {
        self.engine.lock().keys.logical_codes()
    }

    /// Latest physical event of every held key, oldest first
    pub fn pressed_events(&self) -> Vec<KeyEvent> {
        self.engine.lock().keys.physical_events()
    }

    /// Held keys the rest of the system has not seen pressed
    pub(crate) fn withheld_events(&self) -> Vec<KeyEvent> {
        let engine = self.engine.lock();
        engine
            .keys
            .physical_events()
            .into_iter()
            .filter(|e| e.scan_code().is_some_and(|c| !engine.keys.is_logically_pressed(c)))
            .collect()
    }

    pub fn modifier_state(&self, code: u16) -> ModifierState {
        self.engine.lock().modifiers.state(code)
    }

    /// Modifiers currently delivered to the OS as held, ascending
    pub fn allowed_modifiers(&self) -> Vec<u16> {
        let engine = self.engine.lock();
        engine
            .active_modifiers
            .iter()
            .copied()
            .filter(|code| engine.modifiers.state(*code) == ModifierState::Allowed)
            .collect()
    }

    /// Number of blocking hotkeys currently filtering this modifier
    pub fn filtered_count(&self, code: u16) -> usize {
        self.engine.lock().filtered_modifiers.get(&code).copied().unwrap_or(0)
    }

    /// Number of live dispatch-table entries of any kind
    pub fn entry_count(&self) -> usize {
        self.engine.lock().slots.len()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if *self.lifecycle.get_mut() == Lifecycle::Running {
            self.backend.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VirtualBackend;
    use crate::state::signature_of;
    use std::sync::atomic::AtomicBool;

    fn listener() -> (Arc<VirtualBackend>, Arc<Listener>) {
        let backend = Arc::new(VirtualBackend::new());
        let listener = Listener::new(backend.clone(), Settings::new());
        (backend, listener)
    }

    fn down(code: u16) -> KeyEvent {
        KeyEvent::down(code, None)
    }

    fn up(code: u16) -> KeyEvent {
        KeyEvent::up(code, None)
    }

    #[test]
    fn test_plain_events_accepted_and_tracked() {
        let (_, listener) = listener();
        assert!(listener.on_event(down(30)));
        assert!(listener.is_physically_pressed(30));
        assert!(listener.is_logically_pressed(30));
        assert!(listener.on_event(up(30)));
        assert!(listener.pressed_codes().is_empty());
        assert!(listener.logically_pressed_codes().is_empty());
    }

    #[test]
    fn test_replaying_skips_everything() {
        let (_, listener) = listener();
        let _guard = listener.replay_guard();
        assert!(listener.on_event(down(30)));
        assert!(!listener.is_physically_pressed(30));
    }

    #[test]
    fn test_replay_guard_nests() {
        let (_, listener) = listener();
        {
            let _outer = listener.replay_guard();
            {
                let _inner = listener.replay_guard();
            }
            assert!(listener.is_replaying());
        }
        assert!(!listener.is_replaying());
    }

    #[test]
    fn test_blocking_hook_suppresses() {
        let (_, listener) = listener();
        let id = listener.add_blocking_hook(Arc::new(|e: &KeyEvent| e.scan_code() != Some(30)));
        assert!(!listener.on_event(down(30)));
        // Still tracked physically, never logically.
        assert!(listener.is_physically_pressed(30));
        assert!(!listener.is_logically_pressed(30));
        assert!(listener.on_event(down(31)));

        assert!(listener.remove(id));
        assert!(!listener.remove(id));
        assert!(listener.on_event(down(30)));
    }

    #[test]
    fn test_key_hook_suppresses_only_its_code() {
        let (_, listener) = listener();
        listener.add_key_hook(30, true, Arc::new(|_: &KeyEvent| false));
        assert!(!listener.on_event(down(30)));
        assert!(listener.on_event(down(48)));
    }

    #[test]
    fn test_panicking_hook_is_isolated() {
        let (_, listener) = listener();
        listener.add_blocking_hook(Arc::new(|_: &KeyEvent| panic!("boom")));
        assert!(listener.on_event(down(30)));
    }

    #[test]
    fn test_hotkey_entry_filters_modifiers() {
        let (_, listener) = listener();
        let signatures = vec![signature_of([29, 30]), signature_of([30, 97])];
        let id = listener.add_hotkey_entry(&signatures, true, Arc::new(|_: &KeyEvent| false));
        assert_eq!(listener.filtered_count(29), 1);
        assert_eq!(listener.filtered_count(97), 1);
        assert_eq!(listener.filtered_count(30), 0);
        listener.remove(id);
        assert_eq!(listener.filtered_count(29), 0);
        assert_eq!(listener.entry_count(), 0);
    }

    #[test]
    fn test_modifier_withheld_then_released_with_other_key() {
        let (backend, listener) = listener();
        listener.add_hotkey_entry(&[signature_of([29, 30])], true, Arc::new(|_: &KeyEvent| false));

        // ctrl is withheld while ctrl+a is still possible.
        assert!(!listener.on_event(down(29)));
        assert_eq!(listener.modifier_state(29), ModifierState::Pending);

        // ctrl+x is not a hotkey: ctrl is pressed synthetically, x goes through.
        assert!(listener.on_event(down(45)));
        assert_eq!(listener.modifier_state(29), ModifierState::Allowed);
        assert_eq!(backend.synthetic_keys(), vec![(EventType::Down, 29)]);
        assert!(listener.is_logically_pressed(29));
    }

    #[test]
    fn test_modifier_consumed_by_hotkey() {
        let (backend, listener) = listener();
        listener.add_hotkey_entry(&[signature_of([29, 30])], true, Arc::new(|_: &KeyEvent| false));

        assert!(!listener.on_event(down(29)));
        assert!(!listener.on_event(down(30)));
        assert_eq!(listener.modifier_state(29), ModifierState::Suppressed);
        assert!(!listener.on_event(up(30)));
        assert!(!listener.on_event(up(29)));
        assert_eq!(listener.modifier_state(29), ModifierState::Free);
        assert!(backend.synthetic_keys().is_empty());
    }

    #[test]
    fn test_modifier_tap_alone_is_replayed() {
        let (backend, listener) = listener();
        listener.add_hotkey_entry(&[signature_of([29, 30])], true, Arc::new(|_: &KeyEvent| false));

        assert!(!listener.on_event(down(29)));
        assert!(listener.on_event(up(29)));
        assert_eq!(backend.synthetic_keys(), vec![(EventType::Down, 29)]);
    }

    #[test]
    fn test_machine_idle_without_blocking_hotkeys() {
        let (_, listener) = listener();
        listener.add_hotkey_entry(&[signature_of([29, 30])], false, Arc::new(|_: &KeyEvent| false));
        assert!(listener.on_event(down(29)));
        assert!(listener.on_event(down(30)));
        assert_eq!(listener.modifier_state(29), ModifierState::Free);
    }

    #[test]
    fn test_emit_mirrors() {
        let (backend, listener) = listener();
        listener.emit(EventType::Down, 42, Mirror::Both).unwrap();
        assert!(listener.is_physically_pressed(42));
        assert!(listener.is_logically_pressed(42));
        listener.emit(EventType::Up, 42, Mirror::Both).unwrap();
        assert!(!listener.is_physically_pressed(42));

        listener.emit(EventType::Down, 29, Mirror::Logical).unwrap();
        assert!(!listener.is_physically_pressed(29));
        assert!(listener.is_logically_pressed(29));
        assert_eq!(backend.synthetic_keys().len(), 3);
        assert!(!listener.is_replaying());
    }

    #[test]
    fn test_start_and_dispatch_to_handlers() {
        let (backend, listener) = listener();
        let (tx, rx) = crossbeam_channel::unbounded();
        listener.add_handler(Arc::new(move |e: &KeyEvent| {
            let _ = tx.send(e.clone());
            true
        }));
        listener.start_if_necessary().unwrap();
        listener.start_if_necessary().unwrap();
        assert_eq!(backend.init_calls(), 1);

        backend.inject_down(30);
        let seen = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(seen.scan_code(), Some(30));
        listener.shutdown();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_failed_start_is_sticky() {
        let backend = Arc::new(VirtualBackend::failing("denied"));
        let listener = Listener::new(backend.clone(), Settings::new());
        assert!(matches!(listener.start_if_necessary(), Err(KeyhookError::Backend(_))));
        assert!(matches!(
            listener.start_if_necessary(),
            Err(KeyhookError::ListenerUnavailable(_))
        ));
        assert_eq!(backend.init_calls(), 1);
    }

    #[test]
    fn test_observers_see_suppressed_events() {
        let (backend, listener) = listener();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = seen.clone();
        listener.add_handler(Arc::new(move |_: &KeyEvent| {
            flag.store(true, Ordering::SeqCst);
            true
        }));
        listener.add_blocking_hook(Arc::new(|_: &KeyEvent| false));
        listener.start_if_necessary().unwrap();
        assert!(!backend.inject_down(30));
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !seen.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(seen.load(Ordering::SeqCst));
        listener.shutdown();
    }
}
