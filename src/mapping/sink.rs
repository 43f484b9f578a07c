//! Key-event sinks
//!
//! A sink is the only thing in the process that injects key events into the
//! OS. Exactly one instance exists and it is owned by the
//! [`KeyStateTracker`](super::tracker::KeyStateTracker).

use crate::config::KeyboardBackend;
use crate::mapping::{KeyboardConfig, SinkError, VirtualKey};
use tracing::{info, warn};

/// Capability to press and release virtual keys
pub trait KeyEventSink: Send + 'static {
    fn press(&mut self, key: VirtualKey) -> Result<(), SinkError>;

    fn release(&mut self, key: VirtualKey) -> Result<(), SinkError>;

    fn name(&self) -> &str;
}

/// Sink that only writes the key events to the log
#[derive(Debug, Default)]
pub struct LoggingKeyboard;

impl KeyEventSink for LoggingKeyboard {
    fn press(&mut self, key: VirtualKey) -> Result<(), SinkError> {
        info!("press {}", key);
        Ok(())
    }

    fn release(&mut self, key: VirtualKey) -> Result<(), SinkError> {
        info!("release {}", key);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(target_os = "linux")]
pub use uinput::UinputKeyboard;

#[cfg(target_os = "linux")]
mod uinput {
    use super::KeyEventSink;
    use crate::mapping::{KeyboardConfig, SinkError, VirtualKey};
    use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
    use evdev::{AttributeSet, EventType, InputEvent, Key};
    use tracing::{debug, info};

    const DEVICE_NAME: &str = "Switch2 Bridge Keyboard";

    /// Virtual keyboard created through /dev/uinput
    pub struct UinputKeyboard {
        device: VirtualDevice,
    }

    impl UinputKeyboard {
        /// Registers exactly the keys of `config` on a new virtual device.
        pub fn create(config: &KeyboardConfig) -> Result<Self, SinkError> {
            let mut keys = AttributeSet::<Key>::new();
            for key in config.keys() {
                keys.insert(evdev_key(key));
            }

            let device = VirtualDeviceBuilder::new()
                .and_then(|builder| builder.name(DEVICE_NAME).with_keys(&keys))
                .and_then(|builder| builder.build())
                .map_err(|e| SinkError::InitializationError(e.to_string()))?;

            info!("Created uinput device '{}'", DEVICE_NAME);
            Ok(Self { device })
        }

        fn emit(&mut self, key: VirtualKey, value: i32) -> Result<(), SinkError> {
            debug!("uinput {} = {}", key, value);
            self.device
                .emit(&[InputEvent::new(EventType::KEY, evdev_key(key).code(), value)])
                .map_err(|e| SinkError::EmitError {
                    key,
                    message: e.to_string(),
                })
        }
    }

    impl KeyEventSink for UinputKeyboard {
        fn press(&mut self, key: VirtualKey) -> Result<(), SinkError> {
            self.emit(key, 1)
        }

        fn release(&mut self, key: VirtualKey) -> Result<(), SinkError> {
            self.emit(key, 0)
        }

        fn name(&self) -> &str {
            "uinput"
        }
    }

    fn evdev_key(key: VirtualKey) -> Key {
        match key {
            VirtualKey::Z => Key::KEY_Z,
            VirtualKey::X => Key::KEY_X,
            VirtualKey::C => Key::KEY_C,
            VirtualKey::V => Key::KEY_V,
            VirtualKey::Q => Key::KEY_Q,
            VirtualKey::E => Key::KEY_E,
            VirtualKey::Num1 => Key::KEY_1,
            VirtualKey::Num3 => Key::KEY_3,
            VirtualKey::P => Key::KEY_P,
            VirtualKey::M => Key::KEY_M,
            VirtualKey::H => Key::KEY_H,
            VirtualKey::O => Key::KEY_O,
            VirtualKey::F => Key::KEY_F,
            VirtualKey::G => Key::KEY_G,
            VirtualKey::Num9 => Key::KEY_9,
            VirtualKey::Num0 => Key::KEY_0,
            VirtualKey::ArrowUp => Key::KEY_UP,
            VirtualKey::ArrowDown => Key::KEY_DOWN,
            VirtualKey::ArrowLeft => Key::KEY_LEFT,
            VirtualKey::ArrowRight => Key::KEY_RIGHT,
            VirtualKey::W => Key::KEY_W,
            VirtualKey::A => Key::KEY_A,
            VirtualKey::S => Key::KEY_S,
            VirtualKey::D => Key::KEY_D,
            VirtualKey::I => Key::KEY_I,
            VirtualKey::J => Key::KEY_J,
            VirtualKey::K => Key::KEY_K,
            VirtualKey::L => Key::KEY_L,
        }
    }

}

/// Opens the sink selected in the settings.
///
/// Falls back to [`LoggingKeyboard`] when uinput is unavailable so the bridge
/// still runs (and shows its status) without injection rights.
pub fn open_sink(
    backend: KeyboardBackend,
    config: &KeyboardConfig,
) -> Box<dyn KeyEventSink> {
    match backend {
        KeyboardBackend::Log => Box::new(LoggingKeyboard),
        #[cfg(target_os = "linux")]
        KeyboardBackend::Uinput => match UinputKeyboard::create(config) {
            Ok(keyboard) => Box::new(keyboard),
            Err(e) => {
                warn!("{}, falling back to log output", e);
                Box::new(LoggingKeyboard)
            }
        },
        #[cfg(not(target_os = "linux"))]
        KeyboardBackend::Uinput => {
            let _ = config;
            warn!("uinput is only available on Linux, falling back to log output");
            Box::new(LoggingKeyboard)
        }
    }
}
