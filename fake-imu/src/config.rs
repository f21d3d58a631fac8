//! Configuration for the fake IMU daemon
//!
//! Loads configuration from a TOML file. Every section has defaults so a
//! partial file (or no file at all) is enough to run against real hardware.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Length of one binary telemetry frame
pub const DEFAULT_FRAME_LEN: usize = 58;

/// Frame replay rate
pub const DEFAULT_RATE_HZ: u32 = 30;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0")
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read poll timeout in milliseconds
    ///
    /// A pending read holds the port, so queued frames wait up to this long.
    /// Must stay under half the replay tick period.
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1,
        }
    }
}

impl SerialConfig {
    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Frame replay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Binary frame recording to replay
    pub recording: PathBuf,
    /// Bytes per emitted frame
    pub frame_len: usize,
    /// Frames emitted per second once triggered
    pub rate_hz: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            recording: PathBuf::from("data/imu.bin"),
            frame_len: DEFAULT_FRAME_LEN,
            rate_hz: DEFAULT_RATE_HZ,
        }
    }
}

impl ReplayConfig {
    /// Time between two replay ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.rate_hz.max(1)
    }
}

/// Initial values of the operator toggles
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Dump every read and written frame to the diagnostics stream
    pub debug_output: bool,
    /// Corrupt the checksum of every emitted frame
    pub checksum_error: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use fake_imu::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("fake_imu.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check values the replay loop relies on
    pub fn validate(&self) -> Result<()> {
        if self.replay.frame_len < 4 {
            return Err(Error::Config(format!(
                "replay.frame_len must be at least 4, got {}",
                self.replay.frame_len
            )));
        }
        if self.replay.rate_hz == 0 {
            return Err(Error::Config("replay.rate_hz must be non-zero".to_string()));
        }
        let tick_period = self.replay.tick_period();
        if self.serial.read_timeout() * 2 >= tick_period {
            return Err(Error::Config(format!(
                "serial.read_timeout_ms must be under half the tick period ({:?}), got {}",
                tick_period, self.serial.read_timeout_ms
            )));
        }
        Ok(())
    }
}
