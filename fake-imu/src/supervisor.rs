//! Start/stop lifecycle for the replay engine.
//!
//! The supervisor is what the control surface talks to. `start` loads the
//! recording, opens the serial channel and spawns one replay worker; `stop`
//! signals the worker, joins it and closes the channel it hands back. Both
//! are idempotent: the run state is an explicit `NotRunning | Running` enum
//! rather than a nullable handle.

use crate::channel::SerialChannel;
use crate::config::AppConfig;
use crate::diagnostics::{DiagnosticsSink, StdoutSink};
use crate::error::{Error, Result};
use crate::frames::{self, FrameStore};
use crate::replay::{ReplayControls, ReplayLoop, ReplayState, ReplayStatus, StatusSnapshot};
use crate::transport::Connector;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Per-run replay parameters
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub recording: PathBuf,
    pub frame_len: usize,
    pub tick_period: Duration,
}

impl ReplaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            recording: config.replay.recording.clone(),
            frame_len: config.replay.frame_len,
            tick_period: config.replay.tick_period(),
        }
    }
}

/// Worker thread plus its stop signal
struct ActiveRun {
    device: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<SerialChannel>,
}

enum RunState {
    NotRunning,
    Running(ActiveRun),
}

/// Lifecycle controller for the replay worker
pub struct Supervisor {
    connector: Box<dyn Connector>,
    settings: ReplaySettings,
    controls: Arc<ReplayControls>,
    sink: Arc<dyn DiagnosticsSink>,
    /// Status of the current (or most recent) run
    status: Arc<ReplayStatus>,
    run: RunState,
}

impl Supervisor {
    /// Create a stopped supervisor with both toggles off and diagnostics on stdout
    pub fn new(connector: impl Connector + 'static, settings: ReplaySettings) -> Self {
        Self {
            connector: Box::new(connector),
            settings,
            controls: Arc::new(ReplayControls::default()),
            sink: Arc::new(StdoutSink),
            status: Arc::new(ReplayStatus::new()),
            run: RunState::NotRunning,
        }
    }

    /// Use `controls` for the checksum-error and debug-output toggles
    pub fn with_controls(mut self, controls: Arc<ReplayControls>) -> Self {
        self.controls = controls;
        self
    }

    /// Send diagnostic dumps to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Toggles shared with the running worker
    pub fn controls(&self) -> Arc<ReplayControls> {
        Arc::clone(&self.controls)
    }

    pub fn settings(&self) -> &ReplaySettings {
        &self.settings
    }

    /// Replace the replay parameters used by the next `start`
    pub fn set_settings(&mut self, settings: ReplaySettings) {
        self.settings = settings;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.run, RunState::Running(_))
    }

    /// Device of the current run, if any
    pub fn device(&self) -> Option<&str> {
        match &self.run {
            RunState::Running(run) => Some(&run.device),
            RunState::NotRunning => None,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Load the recording, open `device` and spawn the replay worker.
    ///
    /// A recording directory is resolved to its first `*.bin` file.
    ///
    /// Does nothing if a run is already active. On error no port stays open
    /// and no thread is left behind.
    pub fn start(&mut self, device: &str) -> Result<()> {
        if let RunState::Running(run) = &self.run {
            log::warn!("Replay already running on {}; start ignored", run.device);
            return Ok(());
        }

        let recording = frames::resolve_recording(&self.settings.recording)?;
        let frames = FrameStore::load(&recording)?;
        let channel = SerialChannel::open(self.connector.as_ref(), device)?;

        let stop = Arc::new(AtomicBool::new(false));
        let status = Arc::new(ReplayStatus::new());
        self.status = Arc::clone(&status);

        let worker = ReplayLoop::new(
            channel,
            frames,
            &self.settings,
            Arc::clone(&stop),
            status,
            Arc::clone(&self.controls),
            Arc::clone(&self.sink),
        );

        let handle = thread::Builder::new()
            .name("replay-loop".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("Failed to spawn replay thread: {}", e)))?;

        log::info!(
            "Fake IMU started on {} ({} @ {:?} per frame)",
            device,
            recording.display(),
            self.settings.tick_period
        );

        self.run = RunState::Running(ActiveRun {
            device: device.to_string(),
            stop,
            handle,
        });
        Ok(())
    }

    /// Signal the worker, wait for it to exit and close the channel.
    ///
    /// Blocks for at most about one tick period plus engine teardown. Does
    /// nothing if no run is active.
    pub fn stop(&mut self) -> Result<()> {
        let RunState::Running(run) = std::mem::replace(&mut self.run, RunState::NotRunning) else {
            return Ok(());
        };

        log::info!("Stopping fake IMU on {}...", run.device);
        run.stop.store(true, Ordering::Release);

        let result = match run.handle.join() {
            Ok(mut channel) => channel.close(),
            Err(_) => Err(Error::ThreadPanic),
        };

        self.status.set_state(ReplayState::Stopped);
        log::info!("Fake IMU stopped");
        result
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::transport::MockConnector;
    use std::fs;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> ReplaySettings {
        let recording = dir.path().join("imu.bin");
        fs::write(&recording, vec![0x55u8; 58 * 3]).unwrap();
        ReplaySettings {
            recording,
            frame_len: 58,
            tick_period: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_start_stop_cycle() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let mock = connector.add_device("COM_TEST");
        let mut supervisor =
            Supervisor::new(connector, settings(&dir)).with_sink(Arc::new(MemorySink::new()));

        assert_eq!(supervisor.status().state, ReplayState::Idle);
        supervisor.start("COM_TEST").unwrap();
        assert!(supervisor.is_running());
        assert_eq!(supervisor.device(), Some("COM_TEST"));
        assert!(mock.is_claimed());

        supervisor.stop().unwrap();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.device(), None);
        assert_eq!(supervisor.status().state, ReplayState::Stopped);
        assert!(!mock.is_claimed());
    }

    #[test]
    fn test_double_start_is_noop() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new();
        connector.add_device("COM_TEST");
        connector.add_device("COM_OTHER");
        let mut supervisor =
            Supervisor::new(connector, settings(&dir)).with_sink(Arc::new(MemorySink::new()));

        supervisor.start("COM_TEST").unwrap();
        supervisor.start("COM_OTHER").unwrap();
        assert_eq!(supervisor.device(), Some("COM_TEST"));
        supervisor.stop().unwrap();
    }

    #[test]
    fn test_stop_when_not_running() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = Supervisor::new(MockConnector::new(), settings(&dir));

        supervisor.stop().unwrap();
        supervisor.stop().unwrap();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.status().state, ReplayState::Idle);
    }

    #[test]
    fn test_missing_recording_leaves_port_closed() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new();
        let mock = connector.add_device("COM_TEST");
        let mut config = settings(&dir);
        config.recording = dir.path().join("missing.bin");
        let mut supervisor = Supervisor::new(connector, config);

        let result = supervisor.start("COM_TEST");
        assert!(matches!(result, Err(Error::ResourceNotFound(_))));
        assert!(!supervisor.is_running());
        assert!(!mock.is_claimed());
    }

    #[test]
    fn test_recording_directory_resolves_first_file() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new();
        connector.add_device("COM_TEST");
        let mut config = settings(&dir);
        config.recording = dir.path().to_path_buf();
        let mut supervisor =
            Supervisor::new(connector, config).with_sink(Arc::new(MemorySink::new()));

        supervisor.start("COM_TEST").unwrap();
        assert!(supervisor.is_running());
        supervisor.stop().unwrap();
    }

    #[test]
    fn test_empty_recording_directory_fails() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("recordings");
        fs::create_dir(&empty).unwrap();
        let connector = MockConnector::new();
        let mock = connector.add_device("COM_TEST");
        let mut config = settings(&dir);
        config.recording = empty.clone();
        let mut supervisor = Supervisor::new(connector, config);

        let result = supervisor.start("COM_TEST");
        assert!(matches!(result, Err(Error::ResourceNotFound(p)) if p == empty));
        assert!(!mock.is_claimed());
    }

    #[test]
    fn test_restart_after_stop() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new();
        connector.add_device("COM_TEST");
        let mut supervisor =
            Supervisor::new(connector, settings(&dir)).with_sink(Arc::new(MemorySink::new()));

        supervisor.start("COM_TEST").unwrap();
        supervisor.stop().unwrap();
        supervisor.start("COM_TEST").unwrap();
        assert!(supervisor.is_running());
        assert!(!supervisor.status().triggered);
        supervisor.stop().unwrap();
    }
}
