// Keyhook Waits
// Blocking helpers: wait for a hotkey, read the next event, key or combination

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::KeyhookResult;
use crate::event::{EventType, KeyEvent};
use crate::hotkey::{get_hotkey_name, HotkeyOptions, HotkeySpec};
use crate::keyboard::Keyboard;

/// Shared flag that makes a blocking wait give up.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Triggered,
    Cancelled,
}

impl Keyboard {
    /// Receive from `rx`, checking `cancel` between bounded waits
    fn poll<T>(&self, rx: &Receiver<T>, cancel: &CancelToken) -> Option<T> {
        let interval = self.settings().poll_interval();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match rx.recv_timeout(interval) {
                Ok(value) => return Some(value),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Block until the hotkey is pressed or `cancel` fires
    pub fn wait(
        &self,
        hotkey: impl Into<HotkeySpec>,
        options: HotkeyOptions,
        cancel: &CancelToken,
    ) -> KeyhookResult<WaitOutcome> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = self.add_hotkey(
            hotkey,
            move || {
                let _ = tx.try_send(());
            },
            options,
        )?;
        let outcome = match self.poll(&rx, cancel) {
            Some(()) => WaitOutcome::Triggered,
            None => WaitOutcome::Cancelled,
        };
        self.unhook(handle);
        Ok(outcome)
    }

    /// Block until `cancel` fires
    pub fn wait_forever(&self, cancel: &CancelToken) -> WaitOutcome {
        let interval = self.settings().poll_interval();
        while !cancel.is_cancelled() {
            thread::sleep(interval);
        }
        WaitOutcome::Cancelled
    }

    /// Block until the next event; `None` when cancelled.
    ///
    /// With `suppress`, events are withheld from other applications while
    /// the read is in progress.
    pub fn read_event(&self, suppress: bool, cancel: &CancelToken) -> KeyhookResult<Option<KeyEvent>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = self.hook_blocking(move |event| {
            let _ = tx.send(event.clone());
            !suppress
        })?;
        let result = self.poll(&rx, cancel);
        self.unhook(handle);
        Ok(result)
    }

    /// Name (or scan code) of the next event
    pub fn read_key(&self, suppress: bool, cancel: &CancelToken) -> KeyhookResult<Option<String>> {
        Ok(self.read_event(suppress, cancel)?.map(|event| event_label(&event)))
    }

    /// Canonical name of the next combination: everything held when the
    /// first key is released. With `suppress`, releases are withheld while
    /// reading; presses still reach the OS.
    pub fn read_hotkey(&self, suppress: bool, cancel: &CancelToken) -> KeyhookResult<Option<String>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = Arc::downgrade(self.listener());
        let handle = self.hook_blocking(move |event| {
            if event.event_type() == EventType::Up {
                // Held keys as seen before this release is applied.
                let held: Vec<String> = listener
                    .upgrade()
                    .map(|listener| listener.pressed_events().iter().map(event_label).collect())
                    .unwrap_or_default();
                let _ = tx.send((held, event_label(event)));
            }
            !suppress || event.event_type() == EventType::Down
        })?;
        let result = self.poll(&rx, cancel);
        self.unhook(handle);
        Ok(result.map(|(held, released)| {
            get_hotkey_name(held.into_iter().chain(std::iter::once(released)))
        }))
    }
}

/// Name of an event, falling back to its scan code
pub(crate) fn event_label(event: &KeyEvent) -> String {
    event
        .name()
        .map(str::to_string)
        .or_else(|| event.scan_code().map(|code| code.to_string()))
        .unwrap_or_default()
}
