//! Buffered random-access file handles.
//!
//! A file is opened either for reading or for writing, never both. The read handle keeps one buffered window
//! over the file and repositions inside that window without touching the underlying file; the write handle
//! accumulates bytes and writes them out when the buffer fills or the handle is closed.

use std::cmp;
use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Result, SeqFileError};

/// Default size of the in-memory window of a file handle.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
/// Smallest buffer a file handle accepts.
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Read-only buffered file.
pub struct BufferedFileReader {
    path: PathBuf,
    file: fs::File,
    len: u64,
    buf: Box<[u8]>,
    // file offset of buf[0]; the physical file pointer always sits at buf_start + buf_len
    buf_start: u64,
    buf_len: usize,
    buf_pos: usize,
}

impl BufferedFileReader {
    /// Opens a file for reading with the default buffer size.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    /// Opens a file for reading.
    ///
    /// # Arguments
    /// * `path` - File to be read
    /// * `buf_size` - Read window size, raised to [`MIN_BUFFER_SIZE`] if smaller
    pub fn with_capacity(path: &Path, buf_size: usize) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        let len = file.metadata()?.len();

        return Ok(BufferedFileReader {
            path: path.to_path_buf(),
            file,
            len,
            buf: vec![0; cmp::max(buf_size, MIN_BUFFER_SIZE)].into_boxed_slice(),
            buf_start: 0,
            buf_len: 0,
            buf_pos: 0,
        });
    }

    /// Returns the path the handle was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file length captured at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the logical read position.
    pub fn position(&self) -> u64 {
        self.buf_start + self.buf_pos as u64
    }

    /// Moves the logical read position to `pos`.
    /// Positions inside the buffered window are served without a physical seek.
    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        if pos >= self.buf_start && pos <= self.buf_start + self.buf_len as u64 {
            self.buf_pos = (pos - self.buf_start) as usize;
        } else {
            self.file.seek(SeekFrom::Start(pos))?;
            self.buf_start = pos;
            self.buf_len = 0;
            self.buf_pos = 0;
        }

        return Ok(());
    }

    fn refill(&mut self) -> io::Result<()> {
        self.buf_start += self.buf_len as u64;
        self.buf_len = 0;
        self.buf_pos = 0;
        self.buf_len = self.file.read(&mut self.buf)?;

        return Ok(());
    }
}

impl Read for BufferedFileReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.buf_pos == self.buf_len {
            if out.len() >= self.buf.len() {
                // large reads bypass the window
                self.buf_start += self.buf_len as u64;
                self.buf_len = 0;
                self.buf_pos = 0;
                let read = self.file.read(out)?;
                self.buf_start += read as u64;
                return Ok(read);
            }

            self.refill()?;
            if self.buf_len == 0 {
                return Ok(0);
            }
        }

        let available = &self.buf[self.buf_pos..self.buf_len];
        let read = cmp::min(out.len(), available.len());
        out[..read].copy_from_slice(&available[..read]);
        self.buf_pos += read;

        return Ok(read);
    }
}

impl Seek for BufferedFileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid seek to a negative or overflowing position")
        })?;
        self.seek_to(target)?;

        return Ok(target);
    }
}

/// Write-only buffered file.
pub struct BufferedFileWriter {
    path: PathBuf,
    file: fs::File,
    buf: Vec<u8>,
    capacity: usize,
    flushed: u64,
}

impl BufferedFileWriter {
    /// Creates a new file with the default buffer size. Fails if the file already exists.
    pub fn create(path: &Path) -> Result<Self> {
        Self::with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a new file. Fails with [`SeqFileError::AlreadyExists`] if the file already exists.
    ///
    /// # Arguments
    /// * `path` - File to be created
    /// * `buf_size` - Write buffer size, raised to [`MIN_BUFFER_SIZE`] if smaller
    pub fn with_capacity(path: &Path, buf_size: usize) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|err| SeqFileError::from_create(err, path))?;
        let capacity = cmp::max(buf_size, MIN_BUFFER_SIZE);

        return Ok(BufferedFileWriter {
            path: path.to_path_buf(),
            file,
            buf: Vec::with_capacity(capacity),
            capacity,
            flushed: 0,
        });
    }

    /// Returns the path the handle was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes written so far, buffered bytes included.
    pub fn position(&self) -> u64 {
        self.flushed + self.buf.len() as u64
    }

    /// Writes out buffered bytes and releases the handle.
    pub fn close(mut self) -> io::Result<()> {
        self.flush()?;
        self.file.sync_data()?;

        return Ok(());
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
            self.flushed += self.buf.len() as u64;
            self.buf.clear();
        }

        return Ok(());
    }
}

impl Write for BufferedFileWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.capacity {
            self.flush_buf()?;
        }

        if data.len() >= self.capacity {
            self.file.write_all(data)?;
            self.flushed += data.len() as u64;
        } else {
            self.buf.extend_from_slice(data);
        }

        return Ok(data.len());
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.file.flush()
    }
}

impl Drop for BufferedFileWriter {
    fn drop(&mut self) {
        if let Err(err) = self.flush_buf() {
            log::warn!("failed to flush {} on drop: {}", self.path.display(), err);
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{prelude::*, SeekFrom};

    use rstest::*;

    use super::{BufferedFileReader, BufferedFileWriter, MIN_BUFFER_SIZE};
    use crate::error::SeqFileError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_pattern(path: &std::path::Path, len: usize) -> Vec<u8> {
        let data = Vec::from_iter((0..len).map(|i| (i % 251) as u8));
        let mut writer = BufferedFileWriter::with_capacity(path, MIN_BUFFER_SIZE).unwrap();
        writer.write_all(&data).unwrap();
        assert_eq!(writer.position(), len as u64);
        writer.close().unwrap();

        return data;
    }

    #[rstest]
    #[case(0)]
    #[case(10)]
    #[case(MIN_BUFFER_SIZE)]
    #[case(3 * MIN_BUFFER_SIZE + 17)]
    fn test_write_then_read(tmp_dir: tempfile::TempDir, #[case] len: usize) {
        let path = tmp_dir.path().join("data");
        let data = write_pattern(&path, len);

        let mut reader = BufferedFileReader::with_capacity(&path, MIN_BUFFER_SIZE).unwrap();
        assert_eq!(reader.len(), len as u64);

        let mut restored = Vec::new();
        reader.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, data);
        assert_eq!(reader.position(), len as u64);
    }

    #[rstest]
    fn test_seek(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data");
        let data = write_pattern(&path, 4 * MIN_BUFFER_SIZE);

        let mut reader = BufferedFileReader::with_capacity(&path, MIN_BUFFER_SIZE).unwrap();
        let mut byte = [0u8; 1];

        // inside the buffered window
        reader.read_exact(&mut byte).unwrap();
        reader.seek_to(100).unwrap();
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], data[100]);

        // outside of it
        reader.seek_to(3 * MIN_BUFFER_SIZE as u64 + 5).unwrap();
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], data[3 * MIN_BUFFER_SIZE + 5]);
        assert_eq!(reader.position(), 3 * MIN_BUFFER_SIZE as u64 + 6);

        // backwards
        let pos = reader.seek(SeekFrom::Current(-(2 * MIN_BUFFER_SIZE as i64))).unwrap();
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], data[pos as usize]);

        reader.seek(SeekFrom::End(-1)).unwrap();
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], data[data.len() - 1]);
        assert_eq!(reader.read(&mut byte).unwrap(), 0);

        assert!(reader.seek(SeekFrom::Current(-1_000_000)).is_err());
    }

    #[rstest]
    fn test_large_read_bypasses_buffer(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data");
        let data = write_pattern(&path, 3 * MIN_BUFFER_SIZE);

        let mut reader = BufferedFileReader::with_capacity(&path, MIN_BUFFER_SIZE).unwrap();
        let mut head = [0u8; 3];
        reader.read_exact(&mut head).unwrap();

        let mut rest = vec![0u8; 2 * MIN_BUFFER_SIZE];
        reader.read_exact(&mut rest).unwrap();
        assert_eq!(&rest[..], &data[3..3 + 2 * MIN_BUFFER_SIZE]);
        assert_eq!(reader.position(), 3 + 2 * MIN_BUFFER_SIZE as u64);

        reader.seek_to(1).unwrap();
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head[..], &data[1..4]);
    }

    #[rstest]
    fn test_create_existing_fails(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data");
        write_pattern(&path, 8);

        let result = BufferedFileWriter::create(&path);
        assert!(matches!(result, Err(SeqFileError::AlreadyExists(_))));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }
}
