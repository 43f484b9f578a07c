//! Translation of controller snapshots into virtual key events.
//!
//! ```text
//! ControllerSnapshot ──► KeyboardConfig (fixed table) ──► KeyStateTracker ──► KeyEventSink
//!                                                          (held keys)         (uinput / log)
//! ```
//!
//! The tracker is the single owner of the sink; nothing else in the process
//! injects key events.

pub mod error;
pub mod keyboard;
pub mod sink;
pub mod tracker;

pub use error::{MappingError, SinkError};
pub use keyboard::{ControlInput, KeyBinding, KeyboardConfig, VirtualKey};
pub use sink::{open_sink, KeyEventSink, LoggingKeyboard};
pub use tracker::KeyStateTracker;
