//! Error types for the fake IMU replay engine

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fake IMU error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial device could not be opened or claimed
    #[error("Failed to open device {device}: {reason}")]
    Connect {
        /// Device path that was requested
        device: String,
        /// Why the open failed
        reason: String,
    },

    /// Frame recording does not exist
    #[error("Recording not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    /// Frame recording exists but holds no bytes
    #[error("Recording is empty: {}", .0.display())]
    EmptyRecording(PathBuf),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write registered against a closed channel
    #[error("Serial channel is closed")]
    ChannelClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a connect error for `device` from any displayable cause
    pub fn connect(device: &str, reason: impl std::fmt::Display) -> Self {
        Error::Connect {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }
}
