//! Replay loop - the worker that turns a serial channel into a fake IMU.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ start  ┌─────────────────┐ "$TSC,BIN,30" ┌───────────┐
//! │ Idle │──────▶│ AwaitingTrigger │──────────────▶│ Replaying │
//! └──────┘        └─────────────────┘               └───────────┘
//!                          │ stop flag                    │ stop flag
//!                          ▼                              ▼
//!                    ┌──────────┐   loop exited    ┌─────────┐
//!                    │ Stopping │─────────────────▶│ Stopped │
//!                    └──────────┘                  └─────────┘
//! ```
//!
//! The trigger is detected on the channel's reader thread; the tick loop runs
//! on the worker thread at the configured rate and only observes the trigger
//! flag, so a late observation delays replay by at most one tick. Reads stay
//! armed for the whole run, including while replaying.

use crate::channel::SerialChannel;
use crate::diagnostics::{self, DiagnosticsSink, Direction};
use crate::error::Result;
use crate::frames::{FrameStore, corrupt_checksum};
use crate::supervisor::ReplaySettings;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Inbound command that switches the device into binary frame output
pub const TRIGGER_COMMAND: &str = "$TSC,BIN,30";

/// True if `payload`, with every CR and LF removed, is exactly [`TRIGGER_COMMAND`]
pub fn is_trigger(payload: &[u8]) -> bool {
    let stripped: Vec<u8> = payload
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n')
        .collect();
    stripped == TRIGGER_COMMAND.as_bytes()
}

/// Lifecycle of one replay run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplayState {
    Idle = 0,
    AwaitingTrigger = 1,
    Replaying = 2,
    Stopping = 3,
    Stopped = 4,
}

impl ReplayState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReplayState::AwaitingTrigger,
            2 => ReplayState::Replaying,
            3 => ReplayState::Stopping,
            4 => ReplayState::Stopped,
            _ => ReplayState::Idle,
        }
    }
}

impl std::fmt::Display for ReplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayState::Idle => write!(f, "idle"),
            ReplayState::AwaitingTrigger => write!(f, "awaiting-trigger"),
            ReplayState::Replaying => write!(f, "replaying"),
            ReplayState::Stopping => write!(f, "stopping"),
            ReplayState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Live counters and state of a run, shared with the supervisor
#[derive(Debug, Default)]
pub struct ReplayStatus {
    state: AtomicU8,
    /// Set once by the read path, never cleared within a run
    triggered: AtomicBool,
    frames_queued: AtomicU64,
    frames_written: AtomicU64,
    write_errors: AtomicU64,
    read_errors: AtomicU64,
}

/// Point-in-time copy of [`ReplayStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ReplayState,
    pub triggered: bool,
    pub frames_queued: u64,
    pub frames_written: u64,
    pub write_errors: u64,
    pub read_errors: u64,
}

impl ReplayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReplayState {
        ReplayState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ReplayState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            triggered: self.is_triggered(),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }
}

/// Operator toggles, flipped by the control surface at any time
#[derive(Debug, Default)]
pub struct ReplayControls {
    checksum_error: AtomicBool,
    debug_output: AtomicBool,
}

/// Toggle values sampled for one tick or one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub checksum_error: bool,
    pub debug_output: bool,
}

impl ReplayControls {
    pub fn new(checksum_error: bool, debug_output: bool) -> Self {
        Self {
            checksum_error: AtomicBool::new(checksum_error),
            debug_output: AtomicBool::new(debug_output),
        }
    }

    pub fn set_checksum_error(&self, enabled: bool) {
        self.checksum_error.store(enabled, Ordering::Relaxed);
    }

    pub fn set_debug_output(&self, enabled: bool) {
        self.debug_output.store(enabled, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            checksum_error: self.checksum_error.load(Ordering::Relaxed),
            debug_output: self.debug_output.load(Ordering::Relaxed),
        }
    }
}

/// Background worker for one run
pub struct ReplayLoop {
    channel: SerialChannel,
    frames: FrameStore,
    frame_len: usize,
    tick_period: Duration,
    stop: Arc<AtomicBool>,
    status: Arc<ReplayStatus>,
    controls: Arc<ReplayControls>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl ReplayLoop {
    pub fn new(
        channel: SerialChannel,
        frames: FrameStore,
        settings: &ReplaySettings,
        stop: Arc<AtomicBool>,
        status: Arc<ReplayStatus>,
        controls: Arc<ReplayControls>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            channel,
            frames,
            frame_len: settings.frame_len,
            tick_period: settings.tick_period,
            stop,
            status,
            controls,
            sink,
        }
    }

    /// Run until the stop flag is set, then hand the channel back for closing.
    pub fn run(mut self) -> SerialChannel {
        self.status.set_state(ReplayState::AwaitingTrigger);

        if let Err(e) = self.arm_reader() {
            log::error!("Failed to start reading {}: {}", self.channel.device(), e);
        }
        log::info!(
            "Listening on {} for {:?}",
            self.channel.device(),
            TRIGGER_COMMAND
        );

        while !self.stop.load(Ordering::Acquire) {
            if self.status.is_triggered() {
                if self.status.state() == ReplayState::AwaitingTrigger {
                    log::info!("Replaying {}-byte frames", self.frame_len);
                    self.status.set_state(ReplayState::Replaying);
                }
                self.tick();
            }

            thread::sleep(self.tick_period);
        }

        self.status.set_state(ReplayState::Stopping);
        log::info!(
            "Replay loop stopping ({} frames queued)",
            self.status.frames_queued.load(Ordering::Relaxed)
        );
        self.channel
    }

    /// Register the read handler; it runs on the channel's reader thread.
    fn arm_reader(&mut self) -> Result<()> {
        let status = Arc::clone(&self.status);
        let controls = Arc::clone(&self.controls);
        let sink = Arc::clone(&self.sink);

        self.channel.async_read(move |result| match result {
            Ok(bytes) => {
                if controls.snapshot().debug_output {
                    diagnostics::dump_raw(sink.as_ref(), Direction::Read, bytes);
                }
                if is_trigger(bytes) && !status.triggered.swap(true, Ordering::AcqRel) {
                    log::info!("Trigger command received");
                }
            }
            Err(e) => {
                status.read_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("Serial read failed: {}", e);
            }
        })
    }

    /// Emit one frame.
    fn tick(&mut self) {
        let mut frame = self.frames.next_chunk(self.frame_len);
        if self.controls.snapshot().checksum_error {
            corrupt_checksum(&mut frame);
        }

        let status = Arc::clone(&self.status);
        let controls = Arc::clone(&self.controls);
        let sink = Arc::clone(&self.sink);

        let queued = self.channel.async_write(frame, move |result, data| match result {
            Ok(_) => {
                status.frames_written.fetch_add(1, Ordering::Relaxed);
                if controls.snapshot().debug_output {
                    diagnostics::dump_frame(sink.as_ref(), data);
                }
            }
            Err(e) => {
                status.write_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("Serial write failed: {}", e);
            }
        });

        match queued {
            Ok(()) => {
                self.status.frames_queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("Frame dropped: {}", e),
        }
    }
}
