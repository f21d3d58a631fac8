//! Serial channel with a callback-driven I/O completion engine.
//!
//! The channel owns the open transport. Reads and writes are registrations:
//! the caller hands over a completion handler and returns immediately, and the
//! handler later runs on one of the engine's two threads.
//!
//! ## Thread Model
//!
//! 1. **Reader thread** (started by the first [`SerialChannel::async_read`]):
//!    polls the transport with a short timeout and invokes the read handler
//!    for every completed read, success or error. A new read is re-armed after
//!    every completion, so the channel keeps listening until closed.
//! 2. **Writer thread** (started on open): drains a queue of write requests and
//!    invokes each request's handler with the outcome. Requests are never
//!    coalesced or throttled; a slow peer simply lets the queue grow.
//!
//! Both threads share the transport through a mutex that is held only for the
//! duration of a single read or write call.

use crate::error::{Error, Result};
use crate::transport::{Connector, Transport};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Size of the read buffer handed to the transport
pub const READ_BUFFER_SIZE: usize = 1024;

/// Pause after a read that returned nothing
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Pause after a failed read before re-arming
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Writer wake-up interval for observing shutdown
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Handler invoked for every completed read
pub type ReadHandler = Box<dyn FnMut(Result<&[u8]>) + Send>;

/// Handler invoked once when a write completes; gets bytes transferred and the payload
pub type WriteHandler = Box<dyn FnOnce(Result<usize>, &[u8]) + Send>;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

struct WriteRequest {
    data: Vec<u8>,
    on_complete: WriteHandler,
}

/// Open serial connection plus the threads servicing its completions
pub struct SerialChannel {
    device: String,
    /// `None` once closed
    transport: Option<SharedTransport>,
    /// Shutdown signal for the engine threads
    shutdown: Arc<AtomicBool>,
    write_tx: Option<Sender<WriteRequest>>,
    reader_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl SerialChannel {
    /// Open `device` through `connector` and start the write engine.
    pub fn open(connector: &dyn Connector, device: &str) -> Result<Self> {
        let transport: SharedTransport = Arc::new(Mutex::new(connector.connect(device)?));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (write_tx, write_rx) = unbounded();

        let writer_transport = Arc::clone(&transport);
        let writer_shutdown = Arc::clone(&shutdown);
        let writer_handle = thread::Builder::new()
            .name("serial-writer".to_string())
            .spawn(move || writer_loop(writer_transport, writer_shutdown, write_rx))
            .map_err(|e| Error::Other(format!("Failed to spawn writer thread: {}", e)))?;

        log::info!("Serial channel open on {}", device);

        Ok(Self {
            device: device.to_string(),
            transport: Some(transport),
            shutdown,
            write_tx: Some(write_tx),
            reader_handle: None,
            writer_handle: Some(writer_handle),
        })
    }

    /// Device this channel was opened on
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Whether the connection handle is still live
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Register the read-completion handler and start listening.
    ///
    /// The handler runs on the reader thread for every completed read. Only
    /// one reader exists per channel; a second registration is rejected.
    pub fn async_read<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnMut(Result<&[u8]>) + Send + 'static,
    {
        let Some(transport) = self.transport.as_ref().map(Arc::clone) else {
            return Err(Error::ChannelClosed);
        };
        if self.reader_handle.is_some() {
            return Err(Error::Other(format!(
                "Read already pending on {}",
                self.device
            )));
        }

        let shutdown = Arc::clone(&self.shutdown);
        let handler: ReadHandler = Box::new(handler);
        self.reader_handle = Some(
            thread::Builder::new()
                .name("serial-reader".to_string())
                .spawn(move || reader_loop(transport, shutdown, handler))
                .map_err(|e| Error::Other(format!("Failed to spawn reader thread: {}", e)))?,
        );
        Ok(())
    }

    /// Queue `data` for writing; `handler` runs on the writer thread once the
    /// write completes.
    pub fn async_write<F>(&self, data: Vec<u8>, handler: F) -> Result<()>
    where
        F: FnOnce(Result<usize>, &[u8]) + Send + 'static,
    {
        let tx = self.write_tx.as_ref().ok_or(Error::ChannelClosed)?;
        tx.send(WriteRequest {
            data,
            on_complete: Box::new(handler),
        })
        .map_err(|_| Error::ChannelClosed)
    }

    /// Stop the engine threads and release the connection. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Ok(());
        }

        self.shutdown.store(true, Ordering::Relaxed);
        // Dropping the sender wakes the writer immediately
        self.write_tx = None;

        let mut result = Ok(());
        if let Some(handle) = self.reader_handle.take() {
            if handle.join().is_err() {
                result = Err(Error::ThreadPanic);
            }
        }
        if let Some(handle) = self.writer_handle.take() {
            if handle.join().is_err() {
                result = Err(Error::ThreadPanic);
            }
        }

        self.transport = None;
        log::info!("Serial channel on {} closed", self.device);
        result
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Reader loop - re-arms a read after every completion until shutdown
fn reader_loop(transport: SharedTransport, shutdown: Arc<AtomicBool>, mut handler: ReadHandler) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        let result = {
            let Ok(mut port) = transport.lock() else {
                log::error!("Reader: mutex poisoned, exiting");
                break;
            };
            port.read(&mut buffer)
        };

        match result {
            Ok(0) => thread::sleep(IDLE_POLL_INTERVAL),
            Ok(n) => handler(Ok(&buffer[..n])),
            Err(e) => {
                handler(Err(e));
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }

    log::debug!("Reader thread exiting");
}

/// Writer loop - performs queued writes in order until shutdown
fn writer_loop(
    transport: SharedTransport,
    shutdown: Arc<AtomicBool>,
    requests: Receiver<WriteRequest>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let request = match requests.recv_timeout(WRITER_POLL_INTERVAL) {
            Ok(request) => request,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        let result = {
            let Ok(mut port) = transport.lock() else {
                log::error!("Writer: mutex poisoned, exiting");
                break;
            };
            port.write(&request.data)
                .and_then(|n| port.flush().map(|_| n))
        };

        (request.on_complete)(result, &request.data);
    }

    log::debug!("Writer thread exiting");
}
