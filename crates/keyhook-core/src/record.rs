// Keyhook Record/Replay
// Capture events through a non-blocking handler and play them back with their timing

use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::error::{KeyhookError, KeyhookResult};
use crate::event::{EventType, KeyEvent};
use crate::hotkey::{HotkeyOptions, HotkeySpec};
use crate::keyboard::{HookHandle, Keyboard};
use crate::listener::Mirror;
use crate::wait::CancelToken;

/// An active recording: its handler and the channel it feeds
pub(crate) struct Recording {
    handle: HookHandle,
    events: Receiver<KeyEvent>,
}

impl Keyboard {
    /// Start collecting every event. Replaces a recording already in progress.
    pub fn start_recording(&self) -> KeyhookResult<()> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = self.hook(move |event| {
            let _ = tx.send(event.clone());
        })?;
        let previous = self.recording.lock().replace(Recording { handle, events: rx });
        if let Some(previous) = previous {
            self.unhook(previous.handle);
        }
        log::debug!("Recording started");
        Ok(())
    }

    /// Stop the current recording and return its events in order
    pub fn stop_recording(&self) -> KeyhookResult<Vec<KeyEvent>> {
        let recording = self.recording.lock().take().ok_or(KeyhookError::NotRecording)?;
        self.unhook(recording.handle);
        let events: Vec<KeyEvent> = recording.events.try_iter().collect();
        log::debug!("Recording stopped with {} events", events.len());
        Ok(events)
    }

    /// Record until the hotkey is pressed (or `cancel` fires)
    pub fn record(
        &self,
        until: impl Into<HotkeySpec>,
        options: HotkeyOptions,
        cancel: &CancelToken,
    ) -> KeyhookResult<Vec<KeyEvent>> {
        self.start_recording()?;
        if let Err(e) = self.wait(until, options, cancel) {
            let _ = self.stop_recording();
            return Err(e);
        }
        self.stop_recording()
    }

    /// Replay events, reproducing the gaps between them.
    ///
    /// Gaps are divided by `speed_factor`; zero or below replays as fast as
    /// possible. Held keys are released first and held modifiers pressed
    /// again at the end. Gaps too long to represent are capped at
    /// [`MAX_REPLAY_GAP`].
    pub fn play(&self, events: &[KeyEvent], speed_factor: f64) -> KeyhookResult<()> {
        let listener = self.listener();
        let held = listener.suspend_held()?;

        let mut last_time: Option<f64> = None;
        for event in events {
            if let Some(last) = last_time {
                if let Some(gap) = replay_gap(event.time() - last, speed_factor) {
                    thread::sleep(gap);
                }
            }
            last_time = Some(event.time());

            match (event.scan_code(), event.name()) {
                (Some(code), _) => listener.emit(event.event_type(), code, Mirror::Logical)?,
                (None, Some(name)) => {
                    let key = HotkeySpec::Text(name.to_string());
                    let down = event.event_type() == EventType::Down;
                    listener.send_mirrored(&key, down, !down, Mirror::Logical)?;
                }
                (None, None) => {}
            }
        }

        listener.resume_modifiers(&held)
    }
}

/// Longest pause between two replayed events
pub const MAX_REPLAY_GAP: Duration = Duration::from_secs(24 * 60 * 60);

/// Pause before the next replayed event, or `None` for no pause
fn replay_gap(elapsed: f64, speed_factor: f64) -> Option<Duration> {
    if speed_factor <= 0.0 || speed_factor.is_nan() {
        return None;
    }
    let seconds = (elapsed / speed_factor).max(0.0);
    if seconds == 0.0 || seconds.is_nan() {
        return None;
    }
    Some(Duration::try_from_secs_f64(seconds).map_or(MAX_REPLAY_GAP, |gap| gap.min(MAX_REPLAY_GAP)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VirtualBackend;
    use std::sync::Arc;

    #[test]
    fn test_stop_without_start() {
        let keyboard = Keyboard::new(Arc::new(VirtualBackend::new()));
        assert!(matches!(keyboard.stop_recording(), Err(KeyhookError::NotRecording)));
    }

    #[test]
    fn test_play_by_code_and_name() {
        let backend = Arc::new(VirtualBackend::new());
        let keyboard = Keyboard::new(backend.clone());
        let events = vec![
            KeyEvent::down(30, Some("a")).with_time(1.0),
            KeyEvent::up(30, Some("a")).with_time(1.01),
            KeyEvent::try_new(EventType::Down, None, Some("b")).unwrap().with_time(1.02),
            KeyEvent::try_new(EventType::Up, None, Some("b")).unwrap().with_time(1.03),
        ];
        keyboard.play(&events, 0.0).unwrap();
        assert_eq!(
            backend.synthetic_keys(),
            vec![
                (EventType::Down, 30),
                (EventType::Up, 30),
                (EventType::Down, 48),
                (EventType::Up, 48),
            ]
        );
    }

    #[test]
    fn test_play_restores_modifiers() {
        let backend = Arc::new(VirtualBackend::new());
        let keyboard = Keyboard::new(backend);
        keyboard.press("ctrl").unwrap();
        keyboard.play(&[KeyEvent::down(30, None), KeyEvent::up(30, None)], 0.0).unwrap();
        assert_eq!(keyboard.pressed_scan_codes(), vec![29]);
        assert_eq!(keyboard.listener().logically_pressed_codes(), vec![29]);
    }

    #[test]
    fn test_play_keeps_held_keys_pressed() {
        let backend = Arc::new(VirtualBackend::new());
        let keyboard = Keyboard::new(backend.clone());
        keyboard.press("b").unwrap();
        keyboard.play(&[KeyEvent::down(30, None), KeyEvent::up(30, None)], 0.0).unwrap();
        assert_eq!(keyboard.pressed_scan_codes(), vec![48]);
        assert_eq!(backend.synthetic_keys()[1], (EventType::Up, 48));
    }

    #[test]
    fn test_replay_gap() {
        assert_eq!(replay_gap(1.0, 0.0), None);
        assert_eq!(replay_gap(1.0, -2.0), None);
        assert_eq!(replay_gap(-1.0, 1.0), None);
        assert_eq!(replay_gap(1.0, 2.0), Some(Duration::from_millis(500)));
        assert_eq!(replay_gap(1.0, 1e-30), Some(MAX_REPLAY_GAP));
        assert_eq!(replay_gap(f64::INFINITY, 1.0), Some(MAX_REPLAY_GAP));
    }
}
