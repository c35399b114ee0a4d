//! In-memory buffers.

use std::cmp::Ordering;
use std::io::{self, prelude::*};

use crate::compare::RawComparator;
use crate::error::{Result, SeqFileError};
use crate::reader::Reader;

/// Growable byte buffer used as scratch space for serialized records.
#[derive(Debug, Clone, Default)]
pub struct DataBuffer {
    data: Vec<u8>,
}

impl DataBuffer {
    pub fn new() -> Self {
        DataBuffer::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DataBuffer {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Returns the bytes written since the last reset.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discards the content, keeping the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Appends exactly `len` bytes read from `input`.
    /// On failure the buffer is left as it was before the call.
    pub fn write_from<R: Read + ?Sized>(&mut self, input: &mut R, len: usize) -> io::Result<()> {
        let start = self.data.len();
        self.data.resize(start + len, 0);
        if let Err(err) = input.read_exact(&mut self.data[start..]) {
            self.data.truncate(start);
            return Err(err);
        }

        return Ok(());
    }
}

impl Write for DataBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sort buffer limited by the number of record bytes it holds.
///
/// Records are appended contiguously to one byte buffer; per record the buffer keeps its start offset, its
/// length and the length of its key.
pub struct SortBuffer {
    limit: usize,
    data: DataBuffer,
    starts: Vec<usize>,
    lengths: Vec<usize>,
    key_lengths: Vec<usize>,
}

impl SortBuffer {
    /// Creates a buffer that reports itself full once it holds `limit` record bytes.
    pub fn new(limit: usize) -> Self {
        SortBuffer {
            limit: limit.max(1),
            data: DataBuffer::new(),
            starts: Vec::new(),
            lengths: Vec::new(),
            key_lengths: Vec::new(),
        }
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Returns the number of buffered record bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.limit
    }

    pub fn reset(&mut self) {
        self.data.reset();
        self.starts.clear();
        self.lengths.clear();
        self.key_lengths.clear();
    }

    /// Moves the next raw record of `reader` into the buffer.
    /// Returns `false` once the reader is exhausted.
    pub fn push_from(&mut self, reader: &mut Reader) -> Result<bool> {
        let start = self.data.len();
        let key_len = match reader.next_raw(&mut self.data)? {
            Some(key_len) => key_len,
            None => return Ok(false),
        };

        self.starts.push(start);
        self.lengths.push(self.data.len() - start);
        self.key_lengths.push(key_len);

        return Ok(true);
    }

    /// Returns the raw bytes and the key length of the `idx`-th buffered record.
    pub fn record(&self, idx: usize) -> (&[u8], usize) {
        let start = self.starts[idx];
        (&self.data.data()[start..start + self.lengths[idx]], self.key_lengths[idx])
    }

    fn key(&self, idx: usize) -> &[u8] {
        let start = self.starts[idx];
        &self.data.data()[start..start + self.key_lengths[idx]]
    }

    /// Returns buffered record indices ordered by key.
    /// The sort is stable: records with equal keys keep their insertion order.
    pub fn sorted_order<C: RawComparator>(&self, comparator: &C) -> Result<Vec<usize>> {
        let mut order = Vec::from_iter(0..self.len());
        let mut failure: Option<SeqFileError> = None;

        order.sort_by(|&a, &b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            comparator.compare(self.key(a), self.key(b)).unwrap_or_else(|err| {
                failure = Some(err);
                Ordering::Equal
            })
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(order),
        }
    }
}
