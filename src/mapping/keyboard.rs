//! Fixed keyboard binding table
//!
//! Every controller input (20 buttons plus four directions per stick) is bound
//! to exactly one virtual key. The table is fixed at build time; it is the
//! layout emulators such as Ryujinx expect for their keyboard profile.

use crate::controller::report::{ButtonType, ControllerSnapshot, JoystickType, StickDirection};
use crate::mapping::MappingError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::info;

macro_rules! bind {
    ($list:expr, $input:expr, $key:expr) => {
        $list.push(KeyBinding {
            input: $input,
            key: $key,
        });
    };
}

/// Number of bindings in the table: 20 buttons + 2 sticks * 4 directions
pub const BINDING_COUNT: usize = 28;

/// Keys the bridge is able to press
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VirtualKey {
    Z,
    X,
    C,
    V,
    Q,
    E,
    Num1,
    Num3,
    P,
    M,
    H,
    O,
    F,
    G,
    Num9,
    Num0,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    W,
    A,
    S,
    D,
    I,
    J,
    K,
    L,
}

impl VirtualKey {
    pub fn label(&self) -> &'static str {
        match self {
            VirtualKey::Z => "z",
            VirtualKey::X => "x",
            VirtualKey::C => "c",
            VirtualKey::V => "v",
            VirtualKey::Q => "q",
            VirtualKey::E => "e",
            VirtualKey::Num1 => "1",
            VirtualKey::Num3 => "3",
            VirtualKey::P => "p",
            VirtualKey::M => "m",
            VirtualKey::H => "h",
            VirtualKey::O => "o",
            VirtualKey::F => "f",
            VirtualKey::G => "g",
            VirtualKey::Num9 => "9",
            VirtualKey::Num0 => "0",
            VirtualKey::ArrowUp => "Up",
            VirtualKey::ArrowDown => "Down",
            VirtualKey::ArrowLeft => "Left",
            VirtualKey::ArrowRight => "Right",
            VirtualKey::W => "w",
            VirtualKey::A => "a",
            VirtualKey::S => "s",
            VirtualKey::D => "d",
            VirtualKey::I => "i",
            VirtualKey::J => "j",
            VirtualKey::K => "k",
            VirtualKey::L => "l",
        }
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single controller input that can hold a key down
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlInput {
    Button(ButtonType),
    Stick(JoystickType, StickDirection),
}

impl ControlInput {
    /// Whether the snapshot wants this input held
    pub fn is_active(&self, snapshot: &ControllerSnapshot) -> bool {
        match self {
            ControlInput::Button(button) => snapshot.is_pressed(*button),
            ControlInput::Stick(stick, direction) => snapshot.is_pushed(*stick, *direction),
        }
    }
}

impl fmt::Display for ControlInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlInput::Button(button) => write!(f, "{:?}", button),
            ControlInput::Stick(stick, direction) => write!(f, "{:?}Stick{:?}", stick, direction),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    pub input: ControlInput,
    pub key: VirtualKey,
}

/// Binding table from controller inputs to virtual keys
#[derive(Debug, Clone)]
pub struct KeyboardConfig {
    bindings: Vec<KeyBinding>,

    /// Name of the layout
    name: String,
}

impl KeyboardConfig {
    /// Builds the fixed default layout
    pub fn default_config() -> Self {
        use ButtonType as B;
        use JoystickType::{Left as LS, Right as RS};
        use StickDirection::*;

        let mut bindings = Vec::with_capacity(BINDING_COUNT);

        // Face and shoulder buttons
        bind!(bindings, ControlInput::Button(B::A), VirtualKey::Z);
        bind!(bindings, ControlInput::Button(B::B), VirtualKey::X);
        bind!(bindings, ControlInput::Button(B::X), VirtualKey::C);
        bind!(bindings, ControlInput::Button(B::Y), VirtualKey::V);
        bind!(bindings, ControlInput::Button(B::L), VirtualKey::Q);
        bind!(bindings, ControlInput::Button(B::R), VirtualKey::E);
        bind!(bindings, ControlInput::Button(B::ZL), VirtualKey::Num1);
        bind!(bindings, ControlInput::Button(B::ZR), VirtualKey::Num3);

        // System buttons
        bind!(bindings, ControlInput::Button(B::Plus), VirtualKey::P);
        bind!(bindings, ControlInput::Button(B::Minus), VirtualKey::M);
        bind!(bindings, ControlInput::Button(B::Home), VirtualKey::H);
        bind!(bindings, ControlInput::Button(B::Capture), VirtualKey::O);
        bind!(bindings, ControlInput::Button(B::LeftStick), VirtualKey::F);
        bind!(bindings, ControlInput::Button(B::RightStick), VirtualKey::G);
        bind!(bindings, ControlInput::Button(B::GL), VirtualKey::Num9);
        bind!(bindings, ControlInput::Button(B::GR), VirtualKey::Num0);

        // D-Pad
        bind!(bindings, ControlInput::Button(B::DPadUp), VirtualKey::ArrowUp);
        bind!(bindings, ControlInput::Button(B::DPadDown), VirtualKey::ArrowDown);
        bind!(bindings, ControlInput::Button(B::DPadLeft), VirtualKey::ArrowLeft);
        bind!(bindings, ControlInput::Button(B::DPadRight), VirtualKey::ArrowRight);

        // Left stick -> WASD
        bind!(bindings, ControlInput::Stick(LS, Up), VirtualKey::W);
        bind!(bindings, ControlInput::Stick(LS, Left), VirtualKey::A);
        bind!(bindings, ControlInput::Stick(LS, Down), VirtualKey::S);
        bind!(bindings, ControlInput::Stick(LS, Right), VirtualKey::D);

        // Right stick -> IJKL
        bind!(bindings, ControlInput::Stick(RS, Up), VirtualKey::I);
        bind!(bindings, ControlInput::Stick(RS, Left), VirtualKey::J);
        bind!(bindings, ControlInput::Stick(RS, Down), VirtualKey::K);
        bind!(bindings, ControlInput::Stick(RS, Right), VirtualKey::L);

        KeyboardConfig {
            bindings,
            name: "Ryujinx-Keyboard".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    pub fn keys(&self) -> impl Iterator<Item = VirtualKey> + '_ {
        self.bindings.iter().map(|binding| binding.key)
    }

    #[cfg(test)]
    pub fn key_for(&self, input: ControlInput) -> Option<VirtualKey> {
        self.bindings
            .iter()
            .find(|binding| binding.input == input)
            .map(|binding| binding.key)
    }

    /// Desired state of every bound key for `snapshot`
    pub fn desired_keys<'a>(
        &'a self,
        snapshot: &'a ControllerSnapshot,
    ) -> impl Iterator<Item = (VirtualKey, bool)> + 'a {
        self.bindings
            .iter()
            .map(move |binding| (binding.key, binding.input.is_active(snapshot)))
    }

    /// Checks that every input and every key appears exactly once.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.bindings.len() != BINDING_COUNT {
            return Err(MappingError::ConfigError(format!(
                "Expected {} bindings, found {}",
                BINDING_COUNT,
                self.bindings.len()
            )));
        }

        let mut inputs = HashSet::new();
        let mut keys = HashSet::new();
        for binding in &self.bindings {
            if !inputs.insert(binding.input) {
                return Err(MappingError::ConfigError(format!(
                    "Input {} is bound twice",
                    binding.input
                )));
            }
            if !keys.insert(binding.key) {
                return Err(MappingError::ConfigError(format!(
                    "Key {} is bound twice",
                    binding.key
                )));
            }
        }

        Ok(())
    }

    /// Human readable summary of the layout
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![format!("Keyboard layout: {}", self.name)];
        let mut buttons = Vec::new();
        let mut left = Vec::new();
        let mut right = Vec::new();
        for binding in &self.bindings {
            match binding.input {
                ControlInput::Button(button) => {
                    buttons.push(format!("{:?}->{}", button, binding.key))
                }
                ControlInput::Stick(JoystickType::Left, _) => left.push(binding.key.label()),
                ControlInput::Stick(JoystickType::Right, _) => right.push(binding.key.label()),
            }
        }
        for chunk in buttons.chunks(4) {
            lines.push(format!("  {}", chunk.join("  ")));
        }
        lines.push(format!("  Left stick: {}", left.concat().to_uppercase()));
        lines.push(format!("  Right stick: {}", right.concat().to_uppercase()));
        lines
    }

    pub fn log_layout(&self) {
        for line in self.describe() {
            info!("{}", line);
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
