//! Segments of intermediate sort files.
//!
//! An intermediate file is a concatenation of sorted segments. Each segment is a complete sequence file
//! (header and records) preceded by its length in bytes as a big-endian `i64`:
//!
//! ```text
//! (<segment length: i64><header><records>)*
//! ```
//!
//! Final output files carry no such prefix.

use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SeqFileError};
use crate::file::{BufferedFileReader, BufferedFileWriter, MIN_BUFFER_SIZE};
use crate::reader::Reader;

/// Writes a segment length prefix.
pub fn write_prefix<W: Write>(out: &mut W, len: u64) -> Result<()> {
    out.write_i64::<BigEndian>(len as i64)?;
    return Ok(());
}

/// Returns the path of the intermediate file produced by sort/merge pass `pass` for `output`.
pub fn pass_path(output: &Path, pass: usize) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(format!(".{}", pass));
    PathBuf::from(name)
}

/// Location of a segment inside an intermediate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Offset of the segment header.
    pub start: u64,
    /// Segment length, header included.
    pub len: u64,
}

impl Segment {
    /// Opens a reader over the segment records.
    pub fn open(&self, path: &Path, buf_size: usize) -> Result<Reader> {
        Reader::open_range(path, buf_size, self.start, self.len)
    }
}

/// Walks the length prefixes of an intermediate file.
pub struct SegmentCursor {
    input: BufferedFileReader,
}

impl SegmentCursor {
    pub fn open(path: &Path) -> Result<Self> {
        return Ok(SegmentCursor {
            input: BufferedFileReader::with_capacity(path, MIN_BUFFER_SIZE)?,
        });
    }

    /// Returns the next segment, or `None` after the last one.
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.input.position() >= self.input.len() {
            return Ok(None);
        }

        let len = self.input.read_i64::<BigEndian>()?;
        let start = self.input.position();
        if len < 0 || start + len as u64 > self.input.len() {
            return Err(SeqFileError::CorruptRecord(format!(
                "segment at offset {} of {} has invalid length {}",
                start - 8,
                self.input.path().display(),
                len
            )));
        }
        self.input.seek_to(start + len as u64)?;

        return Ok(Some(Segment { start, len: len as u64 }));
    }
}

/// Intermediate file owned by the sorter. The file is deleted when the guard is dropped unless it was kept.
pub struct ScratchFile {
    path: PathBuf,
    keep: bool,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        ScratchFile { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarms the guard, leaving the file in place.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("deleted {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to delete {}: {}", self.path.display(), err),
        }
    }
}

/// File being written by the sorter. Deleted on drop unless finished.
pub struct PendingFile {
    // the handle is declared first so it is closed before the guard deletes the file
    file: BufferedFileWriter,
    guard: ScratchFile,
}

impl PendingFile {
    /// Creates `path`. Fails with [`SeqFileError::AlreadyExists`] if it exists, leaving it untouched.
    pub fn create(path: PathBuf) -> Result<Self> {
        let file = BufferedFileWriter::create(&path)?;
        return Ok(PendingFile {
            file,
            guard: ScratchFile::new(path),
        });
    }

    pub fn path(&self) -> &Path {
        self.guard.path()
    }

    pub fn file(&mut self) -> &mut BufferedFileWriter {
        &mut self.file
    }

    /// Flushes and closes the file and keeps it in place.
    pub fn finish(self) -> Result<PathBuf> {
        let PendingFile { file, guard } = self;
        file.close()?;
        return Ok(guard.keep());
    }
}
