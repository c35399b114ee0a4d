//! K-way merge queue.

use std::cmp::Ordering;
use std::io::Write;

use crate::buffer::DataBuffer;
use crate::compare::RawComparator;
use crate::error::Result;
use crate::reader::Reader;
use crate::writer::Writer;

/// Open input of a merge together with its next raw record.
struct MergeStream {
    reader: Reader,
    record: DataBuffer,
    key_len: usize,
    // position of the input among the merged ones; breaks ties between equal keys
    ordinal: usize,
}

impl MergeStream {
    /// Pulls the next record. Returns `false` once the input is exhausted.
    fn advance(&mut self) -> Result<bool> {
        self.record.reset();
        match self.reader.next_raw(&mut self.record)? {
            Some(key_len) => {
                self.key_len = key_len;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn key(&self) -> &[u8] {
        &self.record.data()[..self.key_len]
    }
}

/// Merge queue implementation.
/// A binary min-heap of open inputs ordered by the key of their next record.
/// Merging takes *m* \* log(*n*) comparisons where *m* is the number of records and *n* the number of inputs.
/// Records with equal keys are emitted in the order their inputs were pushed, so merging adjacent sorted
/// segments of a stable sort keeps it stable.
pub struct MergeQueue<'c, C: RawComparator> {
    comparator: &'c C,
    heap: Vec<MergeStream>,
    pushed: usize,
}

impl<'c, C: RawComparator> MergeQueue<'c, C> {
    /// Creates an empty queue for at most `capacity` simultaneously open inputs.
    pub fn with_capacity(comparator: &'c C, capacity: usize) -> Self {
        MergeQueue {
            comparator,
            heap: Vec::with_capacity(capacity),
            pushed: 0,
        }
    }

    /// Returns the number of open inputs.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Adds an input. Inputs must be sorted by the queue comparator, otherwise the result is undefined.
    /// An input without records is closed right away.
    pub fn push(&mut self, reader: Reader) -> Result<()> {
        let mut stream = MergeStream {
            reader,
            record: DataBuffer::new(),
            key_len: 0,
            ordinal: self.pushed,
        };
        self.pushed += 1;

        if !stream.advance()? {
            log::trace!("skipping empty input {}", stream.reader.path().display());
            return Ok(());
        }

        self.heap.push(stream);
        self.sift_up(self.heap.len() - 1)
    }

    /// Returns the smallest pending record and its key length.
    pub fn peek_min(&self) -> Option<(&[u8], usize)> {
        self.heap
            .first()
            .map(|stream| (stream.record.data(), stream.key_len))
    }

    /// Replaces the smallest record with the next record of the same input, closing the input when it is
    /// exhausted.
    pub fn advance_min(&mut self) -> Result<()> {
        let has_next = match self.heap.first_mut() {
            Some(stream) => stream.advance()?,
            None => return Ok(()),
        };

        if has_next {
            self.sift_down(0)
        } else {
            self.pop_min()?;
            Ok(())
        }
    }

    /// Removes the input holding the smallest record and returns its reader.
    pub fn pop_min(&mut self) -> Result<Option<Reader>> {
        if self.heap.is_empty() {
            return Ok(None);
        }

        let stream = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0)?;
        }

        return Ok(Some(stream.reader));
    }

    /// Drains every input into `writer`. Returns the number of records written.
    pub fn merge_into<W: Write>(&mut self, writer: &mut Writer<W>) -> Result<u64> {
        let mut records = 0;
        while let Some((record, key_len)) = self.peek_min() {
            writer.append_raw(record, key_len)?;
            records += 1;
            self.advance_min()?;
        }

        return Ok(records);
    }

    fn less(&self, a: usize, b: usize) -> Result<bool> {
        let (a, b) = (&self.heap[a], &self.heap[b]);
        let ordering = self
            .comparator
            .compare(a.key(), b.key())?
            .then(a.ordinal.cmp(&b.ordinal));

        return Ok(ordering == Ordering::Less);
    }

    fn sift_up(&mut self, mut idx: usize) -> Result<()> {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent)? {
                break;
            }
            self.heap.swap(idx, parent);
            idx = parent;
        }

        return Ok(());
    }

    fn sift_down(&mut self, mut idx: usize) -> Result<()> {
        loop {
            let left = 2 * idx + 1;
            if left >= self.heap.len() {
                break;
            }

            let right = left + 1;
            let smallest = if right < self.heap.len() && self.less(right, left)? {
                right
            } else {
                left
            };
            if !self.less(smallest, idx)? {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }

        return Ok(());
    }
}
