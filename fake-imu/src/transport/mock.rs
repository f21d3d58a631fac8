//! Mock transport for testing

use super::{Connector, Transport};
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// One scripted outcome of a `read` call
enum ReadEvent {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

/// Mock transport for unit testing
///
/// Cloning yields another handle onto the same buffers, so a test can keep
/// one handle while the engine owns the other.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_queue: VecDeque<ReadEvent>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
    claimed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_queue: VecDeque::new(),
                writes: Vec::new(),
                fail_writes: false,
                claimed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inject data to be read
    ///
    /// Each call is delivered by its own `read`, as a single serial burst would be.
    pub fn inject_read(&self, data: &[u8]) {
        self.lock().read_queue.push_back(ReadEvent::Data(data.to_vec()));
    }

    /// Make the next `read` fail with `kind`
    pub fn inject_read_error(&self, kind: io::ErrorKind) {
        self.lock().read_queue.push_back(ReadEvent::Fail(kind));
    }

    /// Make every subsequent `write` fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Payloads of every successful `write` call, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Number of successful `write` calls
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Whether a connector currently holds this device open
    pub fn is_claimed(&self) -> bool {
        self.lock().claimed
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        match inner.read_queue.pop_front() {
            None => Ok(0),
            Some(ReadEvent::Fail(kind)) => Err(io::Error::new(kind, "injected read error").into()),
            Some(ReadEvent::Data(mut data)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    inner.read_queue.push_front(ReadEvent::Data(rest));
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write error").into());
        }
        inner.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport handed out by [`MockConnector`]; releases the claim on drop
struct ClaimedMock {
    transport: MockTransport,
}

impl Transport for ClaimedMock {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.transport.read(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.transport.write(data)
    }

    fn flush(&mut self) -> Result<()> {
        self.transport.flush()
    }
}

impl Drop for ClaimedMock {
    fn drop(&mut self) {
        self.transport.lock().claimed = false;
    }
}

/// Connector resolving device names to registered mock transports
#[derive(Clone, Default)]
pub struct MockConnector {
    devices: Arc<Mutex<HashMap<String, MockTransport>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device name and return the test's handle onto it
    pub fn add_device(&self, name: &str) -> MockTransport {
        let transport = MockTransport::new();
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), transport.clone());
        transport
    }
}

impl Connector for MockConnector {
    fn connect(&self, device: &str) -> Result<Box<dyn Transport>> {
        let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let transport = devices
            .get(device)
            .ok_or_else(|| Error::connect(device, "no such device"))?;

        {
            let mut inner = transport.lock();
            if inner.claimed {
                return Err(Error::connect(device, "device already open"));
            }
            inner.claimed = true;
        }

        Ok(Box::new(ClaimedMock {
            transport: transport.clone(),
        }))
    }
}
