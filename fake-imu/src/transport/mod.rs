//! Transport layer for serial I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
pub use mock::{MockConnector, MockTransport};
pub use serial::{SerialConnector, SerialTransport};

/// Transport trait for the serial byte stream
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    ///
    /// Returns `Ok(0)` when nothing arrived within the poll timeout.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;
}

/// Opens a transport for a device name
///
/// Keeps the supervisor independent of real hardware so that tests can
/// substitute named mock devices.
pub trait Connector: Send + Sync {
    /// Open and claim `device`, failing with [`crate::Error::Connect`]
    fn connect(&self, device: &str) -> Result<Box<dyn Transport>>;
}
