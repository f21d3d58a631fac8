//! Fake IMU - serial IMU simulator for testing downstream consumers
//!
//! Listens on a serial line for the `$TSC,BIN,30` command and, once it
//! arrives, replays a recorded binary telemetry stream at a fixed rate. The
//! checksum of emitted frames can be corrupted on demand for negative-path
//! testing.
//!
//! - [`supervisor::Supervisor`]: start/stop entry point for a control surface
//! - [`replay`]: the replay worker and its state machine
//! - [`channel::SerialChannel`]: callback-driven serial I/O
//! - [`frames::FrameStore`]: cyclic access to the recording
//! - [`diagnostics`]: hex and frame dumps of serial traffic

pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod frames;
pub mod replay;
pub mod supervisor;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use replay::{ReplayControls, ReplayState, TRIGGER_COMMAND};
pub use supervisor::{ReplaySettings, Supervisor};
