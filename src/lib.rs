// Keyhook
// Library entry point: re-exports the engine and picks a backend for this platform

use std::sync::Arc;

pub use keyhook_core::*;

/// Build the backend for the current platform.
///
/// On Linux with the `evdev-backend` feature this grabs keyboards through
/// evdev and writes through uinput, using the device settings. Elsewhere
/// there is no OS backend; use [`VirtualBackend`] for headless work.
pub fn default_backend(settings: &Settings) -> Result<Arc<dyn Backend>, BackendError> {
    #[cfg(all(feature = "evdev-backend", target_os = "linux"))]
    {
        let options = EvdevOptions {
            device_filter: settings.device_filter().to_vec(),
            virtual_device_name: settings.virtual_device_name().to_string(),
        };
        log::debug!("Using evdev backend");
        Ok(Arc::new(EvdevBackend::new(options)))
    }

    #[cfg(not(all(feature = "evdev-backend", target_os = "linux")))]
    {
        let _ = settings;
        Err(BackendError::Unsupported(
            "no keyboard backend compiled in; enable the evdev-backend feature on Linux".to_string(),
        ))
    }
}

/// Create a [`Keyboard`] over the platform backend, using the settings file
/// if one exists
pub fn open() -> KeyhookResult<Keyboard> {
    let settings = Settings::load_default()?;
    let backend = default_backend(&settings)?;
    Ok(Keyboard::with_settings(backend, settings))
}
