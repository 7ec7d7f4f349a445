// Keyhook Key Events
// The immutable event record exchanged between backends, the listener and subscribers

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{KeyhookError, KeyhookResult};
use crate::names::normalize_name;

/// Direction of a key event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Down,
    Up,
}

impl EventType {
    /// Returns true for key-down events (including auto-repeat)
    pub fn is_down(self) -> bool {
        matches!(self, EventType::Down)
    }

    /// Returns true for key-up events
    pub fn is_up(self) -> bool {
        matches!(self, EventType::Up)
    }
}

/// Seconds elapsed on the process-wide monotonic clock.
///
/// All event timestamps share this origin, so differences between them are
/// meaningful even though the absolute value is not.
pub fn monotonic_time() -> f64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// A single keyboard event.
///
/// Events are immutable once built. At least one of `scan_code` and `name`
/// is always present; names are stored normalized and lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKeyEvent")]
pub struct KeyEvent {
    event_type: EventType,
    scan_code: Option<u16>,
    name: Option<String>,
    time: f64,
    is_keypad: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device: Option<String>,
}

/// Unvalidated wire form used for deserialization.
#[derive(Deserialize)]
struct RawKeyEvent {
    event_type: EventType,
    #[serde(default)]
    scan_code: Option<u16>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    time: f64,
    #[serde(default)]
    is_keypad: bool,
    #[serde(default)]
    device: Option<String>,
}

impl TryFrom<RawKeyEvent> for KeyEvent {
    type Error = KeyhookError;

    fn try_from(raw: RawKeyEvent) -> Result<Self, Self::Error> {
        let event = KeyEvent::try_new(raw.event_type, raw.scan_code, raw.name.as_deref())?;
        Ok(KeyEvent {
            time: raw.time,
            is_keypad: raw.is_keypad,
            device: raw.device,
            ..event
        })
    }
}

/// Event names are normalized and lower-case; case comes from the modifiers
fn event_name(raw: &str) -> Option<String> {
    let name = normalize_name(raw).to_lowercase();
    (!name.is_empty()).then_some(name)
}

impl KeyEvent {
    /// Build an event for a physical key, stamped with the current time.
    pub fn new(event_type: EventType, scan_code: u16, name: Option<&str>) -> Self {
        Self {
            event_type,
            scan_code: Some(scan_code),
            name: name.and_then(event_name),
            time: monotonic_time(),
            is_keypad: false,
            device: None,
        }
    }

    /// Build an event from optional parts, rejecting events with no identity.
    pub fn try_new(
        event_type: EventType,
        scan_code: Option<u16>,
        name: Option<&str>,
    ) -> KeyhookResult<Self> {
        let name = name.and_then(event_name);
        if scan_code.is_none() && name.is_none() {
            return Err(KeyhookError::InvalidEvent(
                "event has neither a scan code nor a name".to_string(),
            ));
        }
        Ok(Self {
            event_type,
            scan_code,
            name,
            time: monotonic_time(),
            is_keypad: false,
            device: None,
        })
    }

    /// Shorthand for a key-down event
    pub fn down(scan_code: u16, name: Option<&str>) -> Self {
        Self::new(EventType::Down, scan_code, name)
    }

    /// Shorthand for a key-up event
    pub fn up(scan_code: u16, name: Option<&str>) -> Self {
        Self::new(EventType::Up, scan_code, name)
    }

    /// Return a copy stamped with the given time
    pub fn with_time(self, time: f64) -> Self {
        Self { time, ..self }
    }

    /// Return a copy flagged as coming from the keypad
    pub fn with_keypad(self, is_keypad: bool) -> Self {
        Self { is_keypad, ..self }
    }

    /// Return a copy tagged with an origin device
    pub fn with_device(self, device: impl Into<String>) -> Self {
        Self {
            device: Some(device.into()),
            ..self
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn scan_code(&self) -> Option<u16> {
        self.scan_code
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_keypad(&self) -> bool {
        self.is_keypad
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse an event previously produced by [`KeyEvent::to_json`]
    pub fn from_json(line: &str) -> KeyhookResult<Self> {
        serde_json::from_str(line).map_err(|e| KeyhookError::InvalidEvent(e.to_string()))
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.scan_code) {
            (Some(name), _) => write!(f, "KeyEvent({} {})", name, self.event_type),
            (None, Some(code)) => write!(f, "KeyEvent({} {})", code, self.event_type),
            (None, None) => write!(f, "KeyEvent(unknown {})", self.event_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::Down.to_string(), "down");
        assert_eq!(EventType::Up.to_string(), "up");
        assert_eq!("down".parse::<EventType>().unwrap(), EventType::Down);
        assert!(EventType::Down.is_down());
        assert!(EventType::Up.is_up());
    }

    #[test]
    fn test_new_normalizes_name() {
        let event = KeyEvent::down(57, Some("Space"));
        assert_eq!(event.name(), Some("space"));
        assert_eq!(event.scan_code(), Some(57));
        assert_eq!(event.event_type(), EventType::Down);
    }

    #[test]
    fn test_event_names_are_lower_case() {
        let event = KeyEvent::down(30, Some("A"));
        assert_eq!(event.name(), Some("a"));
        let named = KeyEvent::try_new(EventType::Up, None, Some("Right_Shift")).unwrap();
        assert_eq!(named.name(), Some("right shift"));
    }

    #[test]
    fn test_try_new_requires_identity() {
        assert!(KeyEvent::try_new(EventType::Down, None, None).is_err());
        assert!(KeyEvent::try_new(EventType::Down, None, Some("")).is_err());
        let named = KeyEvent::try_new(EventType::Up, None, Some("space")).unwrap();
        assert_eq!(named.scan_code(), None);
        assert_eq!(named.name(), Some("space"));
    }

    #[test]
    fn test_json_line() {
        let event = KeyEvent::down(25, Some("p")).with_time(1.5);
        let json = event.to_json();
        assert!(json.contains("\"event_type\":\"down\""));
        assert!(json.contains("\"scan_code\":25"));
        assert!(json.contains("\"name\":\"p\""));
        assert_eq!(KeyEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_json_rejects_anonymous_event() {
        let result = KeyEvent::from_json(r#"{"event_type": "up", "time": 0.0}"#);
        assert!(matches!(result, Err(KeyhookError::InvalidEvent(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(KeyEvent::up(57, Some("space")).to_string(), "KeyEvent(space up)");
        assert_eq!(KeyEvent::down(200, None).to_string(), "KeyEvent(200 down)");
    }

    #[test]
    fn test_monotonic_time_advances() {
        let a = monotonic_time();
        let b = monotonic_time();
        assert!(b >= a);
    }
}
