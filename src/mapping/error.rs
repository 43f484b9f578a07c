//! Error definitions for the mapping module

use super::keyboard::VirtualKey;
use thiserror::Error;

/// Errors of the key mapping layer
#[derive(Debug, Error)]
pub enum MappingError {
    /// The binding table is inconsistent
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Errors raised by a [`KeyEventSink`](super::sink::KeyEventSink)
#[derive(Debug, Error)]
pub enum SinkError {
    /// The injection device could not be opened
    #[error("Failed to initialize virtual keyboard: {0}")]
    InitializationError(String),

    /// A single press or release could not be delivered
    #[error("Failed to emit {key}: {message}")]
    EmitError { key: VirtualKey, message: String },
}
