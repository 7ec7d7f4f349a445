// Keyhook Settings Module
// Read-only tuning knobs for timeouts, typing and the evdev backend

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment switch forcing per-event trace logging on
pub const DEBUG_EVENTS_ENV: &str = "KEYHOOK_DEBUG_EVENTS";

/// Settings for keyhook.
///
/// Loaded from a TOML file (default: ~/.config/keyhook/settings.toml):
///
/// ```toml
/// [timing]
/// hotkey_timeout = 1.0
/// word_timeout = 2.0
/// poll_interval = 0.5
///
/// [typing]
/// write_delay = 0.0
/// exact = false
///
/// [debug]
/// events = true
///
/// [evdev]
/// devices = ["/dev/input/event3"]
/// virtual_device_name = "Keyhook (virtual) Keyboard"
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    hotkey_timeout: f64,
    word_timeout: f64,
    poll_interval: f64,
    write_delay: f64,
    exact_typing: Option<bool>,
    debug_events: bool,
    device_filter: Vec<String>,
    virtual_device_name: String,
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
struct SettingsToml {
    #[serde(default)]
    timing: Option<TimingSettings>,

    #[serde(default)]
    typing: Option<TypingSettings>,

    #[serde(default)]
    debug: Option<DebugSettings>,

    #[serde(default)]
    evdev: Option<EvdevSettings>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct TimingSettings {
    #[serde(default)]
    hotkey_timeout: Option<f64>,
    #[serde(default)]
    word_timeout: Option<f64>,
    #[serde(default)]
    poll_interval: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct TypingSettings {
    #[serde(default)]
    write_delay: Option<f64>,
    #[serde(default)]
    exact: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct DebugSettings {
    #[serde(default)]
    events: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct EvdevSettings {
    #[serde(default)]
    devices: Option<Vec<String>>,
    #[serde(default)]
    virtual_device_name: Option<String>,
}

fn non_negative(name: &str, value: f64) -> Result<f64, SettingsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )))
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
        .unwrap_or(false)
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Create settings with the built-in defaults
    pub fn new() -> Self {
        Self {
            hotkey_timeout: 1.0,
            word_timeout: 2.0,
            poll_interval: 0.5,
            write_delay: 0.0,
            exact_typing: None,
            debug_events: env_flag(DEBUG_EVENTS_ENV),
            device_filter: Vec::new(),
            virtual_device_name: "Keyhook (virtual) Keyboard".to_string(),
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let toml_settings: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(timing) = toml_settings.timing {
            if let Some(value) = timing.hotkey_timeout {
                settings.hotkey_timeout = non_negative("hotkey_timeout", value)?;
            }
            if let Some(value) = timing.word_timeout {
                settings.word_timeout = non_negative("word_timeout", value)?;
            }
            if let Some(value) = timing.poll_interval {
                if value <= 0.0 {
                    return Err(SettingsError::InvalidValue(
                        "poll_interval must be positive".to_string(),
                    ));
                }
                settings.poll_interval = non_negative("poll_interval", value)?;
            }
        }

        if let Some(typing) = toml_settings.typing {
            if let Some(value) = typing.write_delay {
                settings.write_delay = non_negative("write_delay", value)?;
            }
            settings.exact_typing = typing.exact;
        }

        if let Some(debug) = toml_settings.debug {
            if let Some(events) = debug.events {
                settings.debug_events = events || env_flag(DEBUG_EVENTS_ENV);
            }
        }

        if let Some(evdev) = toml_settings.evdev {
            if let Some(devices) = evdev.devices {
                settings.device_filter = devices;
            }
            if let Some(name) = evdev.virtual_device_name {
                if name.trim().is_empty() {
                    return Err(SettingsError::InvalidValue(
                        "virtual_device_name cannot be empty".to_string(),
                    ));
                }
                settings.virtual_device_name = name;
            }
        }

        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keyhook").join("settings.toml"))
    }

    /// Load from default location (~/.config/keyhook/settings.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::new())
    }

    /// Reload settings from the original file
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        if let Some(ref path) = self.source_path {
            *self = Self::from_file(path)?;
            Ok(())
        } else {
            Err(SettingsError::InvalidValue("No source path set".to_string()))
        }
    }

    /// Default maximum gap between steps of a multi-step hotkey, in seconds
    pub fn hotkey_timeout(&self) -> f64 {
        self.hotkey_timeout
    }

    /// Default maximum gap between letters of a word, in seconds
    pub fn word_timeout(&self) -> f64 {
        self.word_timeout
    }

    /// Bounded wait used by blocking helpers between cancellation checks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    /// Default delay between typed characters, in seconds
    pub fn write_delay(&self) -> f64 {
        self.write_delay
    }

    /// Forces (or forbids) unicode typing for `write`; `None` leaves it to the platform
    pub fn exact_typing(&self) -> Option<bool> {
        self.exact_typing
    }

    /// Whether every event decision is traced
    pub fn debug_events(&self) -> bool {
        self.debug_events
    }

    pub fn device_filter(&self) -> &[String] {
        &self.device_filter
    }

    pub fn virtual_device_name(&self) -> &str {
        &self.virtual_device_name
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn with_hotkey_timeout(mut self, seconds: f64) -> Self {
        self.hotkey_timeout = seconds.max(0.0);
        self
    }

    pub fn with_word_timeout(mut self, seconds: f64) -> Self {
        self.word_timeout = seconds.max(0.0);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval.as_secs_f64();
        }
        self
    }

    pub fn with_debug_events(mut self, enabled: bool) -> Self {
        self.debug_events = enabled;
        self
    }
}
