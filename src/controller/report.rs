//! Report Decoder
//!
//! Turns one input-report notification of the controller into a
//! [`ControllerSnapshot`]. The layout is fixed:
//!
//! ```text
//! byte  0..=1   ignored (counter / status)
//! byte  2       B A Y X R ZR Plus RS      (bit 0 .. bit 7)
//! byte  3       Down Right Left Up L ZL Minus LS
//! byte  4       Home - GR GL Capture
//! byte  5..=7   left stick, two packed 12-bit values
//! byte  8..=10  right stick, two packed 12-bit values
//! ```
//!
//! Decoding is pure: no I/O and no state, the same bytes always yield the
//! same snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Minimum length of a usable report. Shorter notifications are dropped.
pub const MIN_REPORT_LEN: usize = 11;

/// Magnitude a stick axis has to exceed before it counts as a direction.
pub const STICK_THRESHOLD: f32 = 0.5;

const AXIS_CENTER: f32 = 2048.0;

// Button type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonType {
    A,
    B,
    X,
    Y,
    L,
    R,
    ZL,
    ZR,
    Plus,
    Minus,
    Home,
    Capture,
    LeftStick,
    RightStick,
    GL,
    GR,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

impl ButtonType {
    pub const ALL: [ButtonType; 20] = [
        ButtonType::A,
        ButtonType::B,
        ButtonType::X,
        ButtonType::Y,
        ButtonType::L,
        ButtonType::R,
        ButtonType::ZL,
        ButtonType::ZR,
        ButtonType::Plus,
        ButtonType::Minus,
        ButtonType::Home,
        ButtonType::Capture,
        ButtonType::LeftStick,
        ButtonType::RightStick,
        ButtonType::GL,
        ButtonType::GR,
        ButtonType::DPadUp,
        ButtonType::DPadDown,
        ButtonType::DPadLeft,
        ButtonType::DPadRight,
    ];
}

/// (byte index, mask, button) for every digital input in the report
const BUTTON_BITS: [(usize, u8, ButtonType); 20] = [
    (2, 0x01, ButtonType::B),
    (2, 0x02, ButtonType::A),
    (2, 0x04, ButtonType::Y),
    (2, 0x08, ButtonType::X),
    (2, 0x10, ButtonType::R),
    (2, 0x20, ButtonType::ZR),
    (2, 0x40, ButtonType::Plus),
    (2, 0x80, ButtonType::RightStick),
    (3, 0x01, ButtonType::DPadDown),
    (3, 0x02, ButtonType::DPadRight),
    (3, 0x04, ButtonType::DPadLeft),
    (3, 0x08, ButtonType::DPadUp),
    (3, 0x10, ButtonType::L),
    (3, 0x20, ButtonType::ZL),
    (3, 0x40, ButtonType::Minus),
    (3, 0x80, ButtonType::LeftStick),
    (4, 0x01, ButtonType::Home),
    (4, 0x04, ButtonType::GR),
    (4, 0x08, ButtonType::GL),
    (4, 0x10, ButtonType::Capture),
];

// Joystick type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoystickType {
    Left,
    Right,
}

/// Direction a stick is pushed past [`STICK_THRESHOLD`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StickDirection {
    Up,
    Down,
    Left,
    Right,
}

impl StickDirection {
    pub const ALL: [StickDirection; 4] = [
        StickDirection::Up,
        StickDirection::Down,
        StickDirection::Left,
        StickDirection::Right,
    ];
}

/// Normalized stick position, both axes in [-1.0, 1.0)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StickPosition {
    pub x: f32,
    pub y: f32,
}

impl StickPosition {
    /// Builds a position from the two raw 12-bit axis values.
    pub fn from_raw(raw_x: u16, raw_y: u16) -> Self {
        Self {
            x: normalize_axis(raw_x),
            y: normalize_axis(raw_y),
        }
    }

    /// Strict comparison: a value of exactly 0.5 is not a push.
    pub fn is_pushed(&self, direction: StickDirection) -> bool {
        match direction {
            StickDirection::Up => self.y > STICK_THRESHOLD,
            StickDirection::Down => self.y < -STICK_THRESHOLD,
            StickDirection::Left => self.x < -STICK_THRESHOLD,
            StickDirection::Right => self.x > STICK_THRESHOLD,
        }
    }
}

/// Maps a raw 12-bit axis to [-1.0, 1.0). Full positive deflection is
/// 2047/2048, not 1.0.
pub fn normalize_axis(raw: u16) -> f32 {
    (raw as f32 - AXIS_CENTER) / AXIS_CENTER
}

/// Decoded controller state of a single report
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub pressed: HashSet<ButtonType>,
    pub left_stick: StickPosition,
    pub right_stick: StickPosition,
    /// Raw axis values (lx, ly, rx, ry), kept for diagnostics
    pub raw_axes: [u16; 4],
}

impl ControllerSnapshot {
    pub fn is_pressed(&self, button: ButtonType) -> bool {
        self.pressed.contains(&button)
    }

    pub fn stick(&self, stick: JoystickType) -> StickPosition {
        match stick {
            JoystickType::Left => self.left_stick,
            JoystickType::Right => self.right_stick,
        }
    }

    pub fn is_pushed(&self, stick: JoystickType, direction: StickDirection) -> bool {
        self.stick(stick).is_pushed(direction)
    }
}

/// Decodes one input report.
///
/// Returns `None` for reports shorter than [`MIN_REPORT_LEN`]; partial
/// notifications are expected on a noisy link and are not an error.
pub fn decode(report: &[u8]) -> Option<ControllerSnapshot> {
    if report.len() < MIN_REPORT_LEN {
        debug!("Dropping short report ({} bytes)", report.len());
        return None;
    }

    let pressed = BUTTON_BITS
        .iter()
        .filter(|(index, mask, _)| report[*index] & mask != 0)
        .map(|(_, _, button)| *button)
        .collect();

    let (lx, ly) = unpack_axes(report[5], report[6], report[7]);
    let (rx, ry) = unpack_axes(report[8], report[9], report[10]);

    Some(ControllerSnapshot {
        pressed,
        left_stick: StickPosition::from_raw(lx, ly),
        right_stick: StickPosition::from_raw(rx, ry),
        raw_axes: [lx, ly, rx, ry],
    })
}

// Two 12-bit values share the middle byte: low nibble -> x, high nibble -> y
fn unpack_axes(b0: u8, b1: u8, b2: u8) -> (u16, u16) {
    let x = b0 as u16 | ((b1 as u16 & 0x0F) << 8);
    let y = ((b1 as u16 & 0xF0) >> 4) | ((b2 as u16) << 4);
    (x, y)
}
