//! Controller input decoding
//!
//! The controller streams fixed-layout binary input reports over BLE. This
//! module only knows the byte layout; everything stateful (held keys, the
//! link itself) lives in [`crate::mapping`] and [`crate::bridge`].
//!
//! ```text
//! notification bytes ──► report::decode ──► ControllerSnapshot
//! ```

pub mod report;

pub use report::{
    decode, ButtonType, ControllerSnapshot, JoystickType, StickDirection, StickPosition,
    MIN_REPORT_LEN, STICK_THRESHOLD,
};
