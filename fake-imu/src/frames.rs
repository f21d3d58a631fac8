//! Frame recording store with cyclic chunk access.
//!
//! A recording is the raw byte dump of a real IMU's binary output. It is read
//! once into memory and replayed as a ring: chunks that run past the end wrap
//! around to the start, so a chunk is never short.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Byte written over the checksum when corruption is requested
pub const CORRUPT_BYTE: u8 = b'?';

/// In-memory frame recording with a wrapping read cursor
#[derive(Debug, Clone)]
pub struct FrameStore {
    data: Vec<u8>,
    cursor: usize,
}

impl FrameStore {
    /// Load a recording from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ResourceNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if data.is_empty() {
            return Err(Error::EmptyRecording(path.to_path_buf()));
        }

        log::info!("Loaded recording {} ({} bytes)", path.display(), data.len());
        Ok(Self { data, cursor: 0 })
    }

    /// Build a store from bytes already in memory.
    ///
    /// Returns `None` for an empty recording.
    pub fn from_bytes(data: Vec<u8>) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        Some(Self { data, cursor: 0 })
    }

    /// Recording length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: empty recordings are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the next byte `next_chunk` will return.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Move the cursor back to the start of the recording.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Next `length` bytes of the recording, wrapping at the end.
    pub fn next_chunk(&mut self, length: usize) -> Vec<u8> {
        let mut chunk = Vec::with_capacity(length);
        while chunk.len() < length {
            let take = (length - chunk.len()).min(self.data.len() - self.cursor);
            chunk.extend_from_slice(&self.data[self.cursor..self.cursor + take]);
            self.cursor += take;
            if self.cursor == self.data.len() {
                self.cursor = 0;
            }
        }
        chunk
    }
}

/// Overwrite the two checksum bytes (`len-4`, `len-3`) with [`CORRUPT_BYTE`].
///
/// Frames shorter than 4 bytes are left alone.
pub fn corrupt_checksum(frame: &mut [u8]) {
    let len = frame.len();
    if len >= 4 {
        frame[len - 3] = CORRUPT_BYTE;
        frame[len - 4] = CORRUPT_BYTE;
    }
}

/// List `*.bin` recordings in `dir`, sorted by file name.
pub fn discover_recordings(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut recordings: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    recordings.sort();
    Ok(recordings)
}

/// Resolve a configured recording path.
///
/// Files are returned unchanged. A directory resolves to its first recording
/// in [`discover_recordings`] order.
pub fn resolve_recording(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    discover_recordings(path)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::ResourceNotFound(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(len: usize) -> FrameStore {
        FrameStore::from_bytes((0..len).map(|i| i as u8).collect()).unwrap()
    }

    #[test]
    fn test_sequential_chunks() {
        let mut frames = store(10);
        assert_eq!(frames.next_chunk(4), vec![0, 1, 2, 3]);
        assert_eq!(frames.next_chunk(4), vec![4, 5, 6, 7]);
        assert_eq!(frames.position(), 8);
    }

    #[test]
    fn test_chunk_wraps_at_end() {
        let mut frames = store(10);
        frames.next_chunk(8);
        assert_eq!(frames.next_chunk(4), vec![8, 9, 0, 1]);
        assert_eq!(frames.position(), 2);
    }

    #[test]
    fn test_exact_end_resets_cursor() {
        let mut frames = store(8);
        frames.next_chunk(4);
        frames.next_chunk(4);
        assert_eq!(frames.position(), 0);
        assert_eq!(frames.next_chunk(2), vec![0, 1]);
    }

    #[test]
    fn test_chunk_longer_than_recording() {
        let mut frames = store(3);
        assert_eq!(frames.next_chunk(7), vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(frames.position(), 1);
    }

    #[test]
    fn test_concatenation_is_periodic() {
        let recording: Vec<u8> = (0..=200u8).collect();
        let mut frames = FrameStore::from_bytes(recording.clone()).unwrap();

        let mut stream = Vec::new();
        for _ in 0..17 {
            stream.extend(frames.next_chunk(58));
        }

        let expected: Vec<u8> = recording.iter().copied().cycle().take(17 * 58).collect();
        assert_eq!(stream, expected);
    }

    #[test]
    fn test_rewind() {
        let mut frames = store(10);
        frames.next_chunk(5);
        frames.rewind();
        assert_eq!(frames.next_chunk(2), vec![0, 1]);
    }

    #[test]
    fn test_corrupt_checksum_offsets() {
        let mut frame = vec![b'A'; 58];
        corrupt_checksum(&mut frame);

        for (i, &b) in frame.iter().enumerate() {
            if i == 54 || i == 55 {
                assert_eq!(b, b'?');
            } else {
                assert_eq!(b, b'A');
            }
        }
    }

    #[test]
    fn test_corrupt_checksum_short_frame_untouched() {
        let mut frame = vec![1, 2, 3];
        corrupt_checksum(&mut frame);
        assert_eq!(frame, vec![1, 2, 3]);
    }

    #[test]
    fn test_load_missing_and_empty() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.bin");
        assert!(matches!(
            FrameStore::load(&missing),
            Err(Error::ResourceNotFound(p)) if p == missing
        ));

        let empty = temp_dir.path().join("empty.bin");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(
            FrameStore::load(&empty),
            Err(Error::EmptyRecording(_))
        ));
        assert!(FrameStore::from_bytes(Vec::new()).is_none());
    }

    #[test]
    fn test_load_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("imu.bin");
        fs::write(&path, b"$TSC,BIN,").unwrap();

        let mut frames = FrameStore::load(&path).unwrap();
        assert_eq!(frames.len(), 9);
        assert_eq!(frames.next_chunk(9), b"$TSC,BIN,".to_vec());
    }

    #[test]
    fn test_discover_recordings() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.bin"), b"x").unwrap();
        fs::write(temp_dir.path().join("a.bin"), b"x").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(temp_dir.path().join("dir.bin")).unwrap();

        let found = discover_recordings(temp_dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.bin", "b.bin"]);
    }

    #[test]
    fn test_resolve_recording() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("imu.bin");
        assert_eq!(resolve_recording(&file).unwrap(), file);

        assert!(matches!(
            resolve_recording(temp_dir.path()),
            Err(Error::ResourceNotFound(p)) if p == temp_dir.path()
        ));

        fs::write(temp_dir.path().join("walk.bin"), b"x").unwrap();
        fs::write(&file, b"x").unwrap();
        assert_eq!(resolve_recording(temp_dir.path()).unwrap(), file);
    }
}
