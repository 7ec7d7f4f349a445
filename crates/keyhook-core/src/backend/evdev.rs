// Keyhook Evdev Backend
// Grabs keyboards through evdev and re-emits accepted events through uinput

use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, EventType as EvType, InputEvent, Key};
use parking_lot::Mutex;

use super::{Backend, BackendError, EventCallback, KeyMapping};
use crate::event::{EventType, KeyEvent};
use crate::layout;

/// Poll timeout; bounds how long `stop` takes to be noticed
const POLL_TIMEOUT_MS: i32 = 100;

// Representative keys used to tell keyboards apart from mice and power buttons
const QWERTY_CODES: &[u16] = &[16, 17, 18, 19, 20, 21];
const A_Z_SPACE_CODES: &[u16] = &[57, 30, 44];

/// Device selection and output naming for [`EvdevBackend`]
#[derive(Debug, Clone)]
pub struct EvdevOptions {
    /// Device names or paths to use; empty autodetects keyboards
    pub device_filter: Vec<String>,
    /// Name of the uinput device; devices containing it are never grabbed
    pub virtual_device_name: String,
}

impl Default for EvdevOptions {
    fn default() -> Self {
        Self {
            device_filter: Vec::new(),
            virtual_device_name: "Keyhook (virtual) Keyboard".to_string(),
        }
    }
}

/// Check whether a device should be grabbed.
///
/// An explicit filter matches by exact path or name, virtual devices
/// included. Without a filter only real keyboards are taken, and our own
/// output device is skipped to avoid a feedback loop.
pub fn device_selected(
    device_name: &str,
    device_path: &str,
    filter: &[String],
    is_keyboard: bool,
    virtual_name: &str,
) -> bool {
    if !filter.is_empty() {
        return filter
            .iter()
            .any(|wanted| wanted == device_path || wanted == device_name);
    }
    is_keyboard && !device_name.contains(virtual_name)
}

fn is_keyboard_device(device: &Device) -> bool {
    if !device.supported_events().contains(EvType::KEY) {
        return false;
    }
    let keys = match device.supported_keys() {
        Some(keys) => keys,
        None => return false,
    };
    QWERTY_CODES
        .iter()
        .chain(A_Z_SPACE_CODES)
        .all(|code| keys.contains(Key::new(*code)))
}

/// Grabbed input devices. Ungrabs on drop so a crash never leaves the
/// keyboard captured.
struct GrabbedDevices {
    devices: Vec<Device>,
    poll_fds: Vec<libc::pollfd>,
}

impl GrabbedDevices {
    fn grab(mut devices: Vec<Device>) -> Result<Self, BackendError> {
        // A previous instance may have died holding the grab.
        for device in &mut devices {
            let _ = device.ungrab();
        }
        for device in &mut devices {
            device.grab()?;
        }
        let poll_fds = devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        Ok(Self { devices, poll_fds })
    }

    /// Wait up to `timeout_ms` and collect key events with their device name
    fn poll(&mut self, timeout_ms: i32) -> Result<Vec<(InputEvent, String)>, BackendError> {
        let mut events = Vec::new();
        let ready = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(events);
            }
            return Err(BackendError::Io(err));
        }
        if ready == 0 {
            return Ok(events);
        }

        for (i, device) in self.devices.iter_mut().enumerate() {
            if self.poll_fds[i].revents & libc::POLLIN == 0 {
                continue;
            }
            let device_name = device.name().unwrap_or("Unknown").to_string();
            match device.fetch_events() {
                Ok(fetched) => {
                    for event in fetched.filter(|e| e.event_type() == EvType::KEY) {
                        events.push((event, device_name.clone()));
                    }
                }
                Err(e) => log::warn!("Failed to read from {}: {}", device_name, e),
            }
        }
        Ok(events)
    }
}

impl Drop for GrabbedDevices {
    fn drop(&mut self) {
        for device in &mut self.devices {
            let _ = device.ungrab();
        }
    }
}

/// Linux backend on top of evdev and uinput.
///
/// Keyboards are grabbed exclusively, so other applications only see what
/// the listener accepts: accepted physical events and all synthetic events
/// go out through a single uinput device.
pub struct EvdevBackend {
    options: EvdevOptions,
    pending: Mutex<Vec<Device>>,
    output: Mutex<Option<VirtualDevice>>,
    running: AtomicBool,
}

impl EvdevBackend {
    pub fn new(options: EvdevOptions) -> Self {
        Self {
            options,
            pending: Mutex::new(Vec::new()),
            output: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    fn find_keyboards(&self) -> Result<Vec<Device>, BackendError> {
        let mut keyboards = Vec::new();
        for (path, device) in evdev::enumerate() {
            let name = device.name().unwrap_or("Unknown").to_string();
            let path = path.to_str().unwrap_or_default().to_string();
            if device_selected(
                &name,
                &path,
                &self.options.device_filter,
                is_keyboard_device(&device),
                &self.options.virtual_device_name,
            ) {
                log::debug!("Using input device {} ({})", name, path);
                keyboards.push(device);
            }
        }
        if keyboards.is_empty() {
            return Err(BackendError::PermissionDenied(
                "no readable keyboard devices under /dev/input".to_string(),
            ));
        }
        Ok(keyboards)
    }

    fn build_output(&self) -> Result<VirtualDevice, BackendError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }
        let device = VirtualDeviceBuilder::new()
            .map_err(|e| BackendError::Device(e.to_string()))?
            .name(&self.options.virtual_device_name)
            .with_keys(&keys)
            .map_err(|e| BackendError::Device(e.to_string()))?
            .build()
            .map_err(|e| BackendError::Device(e.to_string()))?;
        Ok(device)
    }

    fn emit(&self, scan_code: u16, value: i32) -> Result<(), BackendError> {
        let mut output = self.output.lock();
        let device = output
            .as_mut()
            .ok_or_else(|| BackendError::Device("output device not initialized".to_string()))?;
        // The kernel only processes key events after a SYN report.
        device.emit(&[
            InputEvent::new(EvType::KEY, scan_code, value),
            InputEvent::new(EvType::SYNCHRONIZATION, 0, 0),
        ])?;
        Ok(())
    }

    fn tap_name(&self, name: &str) -> Result<(), BackendError> {
        let code = layout::lookup(name)
            .first()
            .map(|m| m.scan_code)
            .ok_or_else(|| BackendError::Unmapped(name.to_string()))?;
        self.press(code)?;
        self.release(code)
    }

    fn to_key_event(event: &InputEvent, device_name: &str) -> Option<KeyEvent> {
        let event_type = match event.value() {
            0 => EventType::Up,
            // 2 is auto-repeat, delivered as another down
            1 | 2 => EventType::Down,
            _ => return None,
        };
        let code = event.code();
        let (name, keypad) = layout::name_for(code)
            .map(|(name, keypad)| (Some(name), keypad))
            .unwrap_or((None, false));
        Some(
            KeyEvent::new(event_type, code, name)
                .with_keypad(keypad)
                .with_device(device_name),
        )
    }
}

impl Default for EvdevBackend {
    fn default() -> Self {
        Self::new(EvdevOptions::default())
    }
}

impl Backend for EvdevBackend {
    fn init(&self) -> Result<(), BackendError> {
        let keyboards = self.find_keyboards()?;
        let output = self.build_output()?;
        *self.pending.lock() = keyboards;
        *self.output.lock() = Some(output);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn listen(&self, callback: EventCallback) -> Result<(), BackendError> {
        let devices = std::mem::take(&mut *self.pending.lock());
        let mut grabbed = GrabbedDevices::grab(devices)?;
        log::debug!("Grabbed {} keyboard device(s)", grabbed.devices.len());

        while self.running.load(Ordering::SeqCst) {
            for (raw, device_name) in grabbed.poll(POLL_TIMEOUT_MS)? {
                let event = match Self::to_key_event(&raw, &device_name) {
                    Some(event) => event,
                    None => continue,
                };
                if callback(event) {
                    if let Err(e) = self.emit(raw.code(), raw.value()) {
                        log::warn!("Failed to forward key {}: {}", raw.code(), e);
                    }
                }
            }
        }
        Ok(())
    }

    fn press(&self, scan_code: u16) -> Result<(), BackendError> {
        self.emit(scan_code, 1)
    }

    fn release(&self, scan_code: u16) -> Result<(), BackendError> {
        self.emit(scan_code, 0)
    }

    fn map_name(&self, name: &str) -> Result<Vec<KeyMapping>, BackendError> {
        let mappings = layout::lookup(name);
        if mappings.is_empty() {
            return Err(BackendError::Unmapped(name.to_string()));
        }
        Ok(mappings)
    }

    /// Types through the ctrl+shift+u input-method sequence.
    fn type_unicode(&self, character: char) -> Result<(), BackendError> {
        let ctrl = 29;
        let shift = 42;
        self.press(ctrl)?;
        self.press(shift)?;
        self.tap_name("u")?;
        self.release(shift)?;
        self.release(ctrl)?;
        for digit in format!("{:x}", character as u32).chars() {
            self.tap_name(&digit.to_string())?;
        }
        self.tap_name("space")
    }

    fn name_for(&self, scan_code: u16) -> Option<String> {
        layout::name_for(scan_code).map(|(name, _)| name.to_string())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIRTUAL: &str = "Keyhook (virtual) Keyboard";

    #[test]
    fn test_autodetect_takes_keyboards_only() {
        assert!(device_selected("AT Keyboard", "/dev/input/event0", &[], true, VIRTUAL));
        assert!(!device_selected("USB Mouse", "/dev/input/event1", &[], false, VIRTUAL));
    }

    #[test]
    fn test_autodetect_skips_own_output() {
        assert!(!device_selected(VIRTUAL, "/dev/input/event9", &[], true, VIRTUAL));
    }

    #[test]
    fn test_filter_matches_name_or_path() {
        let filter = vec!["/dev/input/event3".to_string(), "Logitech K120".to_string()];
        assert!(device_selected("Anything", "/dev/input/event3", &filter, false, VIRTUAL));
        assert!(device_selected("Logitech K120", "/dev/input/event7", &filter, true, VIRTUAL));
        assert!(!device_selected("AT Keyboard", "/dev/input/event0", &filter, true, VIRTUAL));
    }

    #[test]
    fn test_key_event_conversion() {
        let down = InputEvent::new(EvType::KEY, 30, 1);
        let event = EvdevBackend::to_key_event(&down, "kbd").unwrap();
        assert_eq!(event.event_type(), EventType::Down);
        assert_eq!(event.name(), Some("a"));
        assert_eq!(event.device(), Some("kbd"));

        let repeat = InputEvent::new(EvType::KEY, 30, 2);
        assert_eq!(
            EvdevBackend::to_key_event(&repeat, "kbd").unwrap().event_type(),
            EventType::Down
        );
        let odd = InputEvent::new(EvType::KEY, 30, 7);
        assert!(EvdevBackend::to_key_event(&odd, "kbd").is_none());
    }
}
