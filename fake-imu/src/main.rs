//! Fake IMU daemon
//!
//! Stands in for the operator control surface: reads the configuration,
//! starts the replay engine on the configured serial device and stops it on
//! Ctrl-C.

use clap::Parser;
use fake_imu::frames;
use fake_imu::transport::SerialConnector;
use fake_imu::{AppConfig, Error, ReplayControls, ReplaySettings, Result, Supervisor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Serial IMU simulator replaying recorded binary frames
#[derive(Parser, Debug)]
#[command(name = "fake-imu", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device (overrides config)
    #[arg(short, long)]
    device: Option<String>,

    /// Binary frame recording (overrides config)
    #[arg(short, long)]
    recording: Option<PathBuf>,

    /// Corrupt the checksum of every emitted frame
    #[arg(long)]
    checksum_error: bool,

    /// Dump serial traffic to stdout
    #[arg(long)]
    debug_output: bool,

    /// Print the available recordings and exit
    #[arg(long)]
    list_recordings: bool,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    if let Some(device) = &args.device {
        config.serial.device = device.clone();
    }
    if let Some(recording) = &args.recording {
        config.replay.recording = recording.clone();
    }
    config.diagnostics.checksum_error |= args.checksum_error;
    config.diagnostics.debug_output |= args.debug_output;
    config.validate()?;
    Ok(config)
}

/// Directory holding the recordings that sit alongside `recording`
fn recordings_dir(recording: &Path) -> &Path {
    if recording.is_dir() {
        return recording;
    }
    match recording.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn list_recordings(recording: &Path) -> Result<()> {
    let dir = recordings_dir(recording);
    let found = frames::discover_recordings(dir)?;
    if found.is_empty() {
        println!("No recordings in {}", dir.display());
    }
    for path in found {
        println!("{}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.list_recordings {
        return list_recordings(&config.replay.recording);
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("fake-imu v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        log::info!("Using config: {}", path.display());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let connector = SerialConnector::new(config.serial.baud_rate, config.serial.read_timeout());
    let controls = Arc::new(ReplayControls::new(
        config.diagnostics.checksum_error,
        config.diagnostics.debug_output,
    ));
    let mut supervisor = Supervisor::new(connector, ReplaySettings::from_config(&config))
        .with_controls(controls);

    supervisor.start(&config.serial.device)?;
    log::info!("Fake IMU running. Press Ctrl-C to stop.");

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    supervisor.stop()?;
    let status = supervisor.status();
    log::info!(
        "Fake IMU stopped ({} frames written, {} write errors, {} read errors)",
        status.frames_written,
        status.write_errors,
        status.read_errors
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recordings_dir() {
        assert_eq!(recordings_dir(Path::new("data/imu.bin")), Path::new("data"));
        assert_eq!(recordings_dir(Path::new("imu.bin")), Path::new("."));

        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(recordings_dir(dir.path()), dir.path());
    }
}
