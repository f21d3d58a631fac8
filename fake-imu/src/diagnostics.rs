//! Operator diagnostics for serial traffic.
//!
//! Reads are dumped as raw hex. Written frames are split into the fields of
//! the 58-byte binary telemetry layout:
//!
//! ```text
//! offset  0..9   ASCII header ("$TSC,BIN,")
//!         9..15  three 16-bit fields (the first printed flush against the header)
//!        15..51  six runs of 6, 6, 6, 4, 8, 6 bytes
//!        51..53  one 16-bit field
//!        53..58  ASCII trailer (checksum marker and line ending)
//! ```

use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::{Arc, Mutex};

/// Length of the binary telemetry frame understood by [`format_frame`]
pub const BIN_FRAME_LEN: usize = 58;

/// Hex field boundaries between the header and the trailer
const HEX_FIELDS: [(usize, usize); 10] = [
    (9, 11),
    (11, 13),
    (13, 15),
    (15, 21),
    (21, 27),
    (27, 33),
    (33, 37),
    (37, 45),
    (45, 51),
    (51, 53),
];

/// Direction of serial traffic relative to the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes received from the peer
    Read,
    /// Bytes sent to the peer
    Write,
}

impl Direction {
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Read => ">",
            Direction::Write => "<",
        }
    }
}

/// Destination for diagnostic lines
pub trait DiagnosticsSink: Send + Sync {
    /// Emit one complete line (without trailing newline)
    fn emit(&self, line: &str);
}

/// Writes diagnostic lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl DiagnosticsSink for StdoutSink {
    fn emit(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
    }
}

/// Collects diagnostic lines in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines emitted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DiagnosticsSink for MemorySink {
    fn emit(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
    }
}

/// Direction marker followed by space-separated uppercase hex bytes
pub fn format_raw(direction: Direction, bytes: &[u8]) -> String {
    let mut line = String::with_capacity(2 + bytes.len() * 3);
    line.push_str(direction.marker());
    for b in bytes {
        let _ = write!(line, " {:02X}", b);
    }
    line
}

/// Field-by-field rendering of a written telemetry frame
///
/// Frames that are not [`BIN_FRAME_LEN`] bytes long fall back to
/// [`format_raw`].
pub fn format_frame(bytes: &[u8]) -> String {
    if bytes.len() != BIN_FRAME_LEN {
        return format_raw(Direction::Write, bytes);
    }

    let mut line = String::with_capacity(128);
    line.push_str(Direction::Write.marker());
    line.push(' ');
    push_ascii(&mut line, &bytes[..9]);
    for (i, &(start, end)) in HEX_FIELDS.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        for b in &bytes[start..end] {
            let _ = write!(line, "{:02X}", b);
        }
    }
    push_ascii(&mut line, &bytes[53..]);
    line
}

/// Append bytes as text, escaping anything non-printable
fn push_ascii(line: &mut String, bytes: &[u8]) {
    let _ = write!(line, "{}", bytes.escape_ascii());
}

/// Emit a raw hex dump of `bytes`
pub fn dump_raw(sink: &dyn DiagnosticsSink, direction: Direction, bytes: &[u8]) {
    sink.emit(&format_raw(direction, bytes));
}

/// Emit a field dump of a written frame
pub fn dump_frame(sink: &dyn DiagnosticsSink, bytes: &[u8]) {
    sink.emit(&format_frame(bytes));
}
