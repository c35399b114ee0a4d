//! External sorter.

use std::cmp;
use std::path::{Path, PathBuf};

use crate::buffer::SortBuffer;
use crate::compare::{NaturalComparator, RawComparator};
use crate::error::{Result, SeqFileError};
use crate::file::MIN_BUFFER_SIZE;
use crate::merger::MergeQueue;
use crate::reader::Reader;
use crate::record::Writable;
use crate::segment::{self, PendingFile, ScratchFile, SegmentCursor};
use crate::writer::{header_len, Writer};

/// Default sort memory budget in bytes.
pub const DEFAULT_MEMORY: usize = 100 * 1024 * 1024;
/// Default number of segments merged at once.
pub const DEFAULT_FACTOR: usize = 100;
/// Smallest merge fan-in.
pub const MIN_FACTOR: usize = 2;

/// Sorter builder. Provides methods for [`Sorter`] initialization.
#[derive(Clone)]
pub struct SorterBuilder<C: RawComparator> {
    /// Sort memory budget in bytes.
    memory: usize,
    /// Maximum number of segments merged at once.
    factor: usize,
    /// Key comparator.
    comparator: C,
    /// Type name of the keys.
    key_type: String,
    /// Type name of the values.
    value_type: String,
}

impl<C: RawComparator> SorterBuilder<C> {
    /// Creates a builder for files declaring the given key and value type names.
    pub fn new(key_type: &str, value_type: &str, comparator: C) -> Self {
        SorterBuilder {
            memory: DEFAULT_MEMORY,
            factor: DEFAULT_FACTOR,
            comparator,
            key_type: key_type.to_string(),
            value_type: value_type.to_string(),
        }
    }

    /// Builds a [`Sorter`] instance using provided configuration.
    pub fn build(self) -> Sorter<C> {
        Sorter {
            memory: self.memory,
            factor: self.factor,
            comparator: self.comparator,
            key_type: self.key_type,
            value_type: self.value_type,
        }
    }

    /// Sets the sort memory budget. A quarter of it is used to buffer records during the sort pass.
    pub fn with_memory(mut self, memory: usize) -> SorterBuilder<C> {
        self.memory = memory;
        return self;
    }

    /// Sets the maximum number of segments merged at once. Values below [`MIN_FACTOR`] are raised to it.
    pub fn with_factor(mut self, factor: usize) -> SorterBuilder<C> {
        self.factor = cmp::max(factor, MIN_FACTOR);
        return self;
    }

    /// Sets the key comparator.
    pub fn with_comparator<C2: RawComparator>(self, comparator: C2) -> SorterBuilder<C2> {
        SorterBuilder {
            memory: self.memory,
            factor: self.factor,
            comparator,
            key_type: self.key_type,
            value_type: self.value_type,
        }
    }
}

impl<K> SorterBuilder<NaturalComparator<K>>
where
    K: Writable + Ord + Default,
{
    /// Creates a builder for files of `K` keys and `V` values ordered by the natural order of `K`.
    pub fn natural<V: Writable + Default>() -> Self {
        SorterBuilder::new(
            K::default().type_name(),
            V::default().type_name(),
            NaturalComparator::new(),
        )
    }
}

/// Outcome of a [`Sorter::sort`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortReport {
    /// Number of sorted segments produced by the sort pass.
    pub segments: usize,
    /// Number of merge passes needed to combine them.
    pub merge_passes: usize,
}

/// External sorter.
///
/// Sorts sequence files of any size in bounded memory: the input is cut into runs of at most a quarter of the
/// memory budget, each run is sorted in memory, and runs are merged `factor` at a time until one remains.
pub struct Sorter<C: RawComparator> {
    memory: usize,
    factor: usize,
    comparator: C,
    key_type: String,
    value_type: String,
}

impl<C: RawComparator> Sorter<C> {
    pub fn memory(&self) -> usize {
        self.memory
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Sorts `input` into a new file `output`. The input is left untouched.
    ///
    /// Intermediate files are created next to the output as `<output>.<pass>` and deleted once merged.
    ///
    /// # Arguments
    /// * `input` - Sequence file to be sorted
    /// * `output` - Result file, must not exist
    pub fn sort(&self, input: &Path, output: &Path) -> Result<SortReport> {
        if output.exists() {
            return Err(SeqFileError::AlreadyExists(output.to_path_buf()));
        }

        log::info!("sorting {} into {}", input.display(), output.display());
        let segments = self.sort_pass(input, output)?;

        let mut report = SortReport {
            segments,
            merge_passes: 0,
        };
        let mut remaining = segments;
        while remaining > 1 {
            report.merge_passes += 1;
            remaining = self.merge_pass(output, report.merge_passes, remaining <= self.factor)?;
        }

        log::info!(
            "sorted {} ({} segments, {} merge passes)",
            output.display(),
            report.segments,
            report.merge_passes
        );
        return Ok(report);
    }

    /// Merges already sorted files into a new file `output` in a single pass.
    /// Inputs must be sorted by the sorter comparator, otherwise the output order is undefined.
    ///
    /// # Arguments
    /// * `inputs` - Sorted sequence files
    /// * `output` - Result file, must not exist
    pub fn merge<P: AsRef<Path>>(&self, inputs: &[P], output: &Path) -> Result<()> {
        if output.exists() {
            return Err(SeqFileError::AlreadyExists(output.to_path_buf()));
        }

        log::info!("merging {} files into {}", inputs.len(), output.display());
        let buf_size = self.merge_buffer_size(inputs.len());
        let mut queue = MergeQueue::with_capacity(&self.comparator, inputs.len());
        for input in inputs {
            let reader = Reader::open_with_buffer(input.as_ref(), buf_size)?;
            self.check_types(&reader)?;
            queue.push(reader)?;
        }

        let mut out = PendingFile::create(output.to_path_buf())?;
        let mut writer = Writer::new(out.file(), &self.key_type, &self.value_type)?;
        let records = queue.merge_into(&mut writer)?;
        out.finish()?;

        log::info!("merged {} records into {}", records, output.display());
        return Ok(());
    }

    fn sort_pass(&self, input: &Path, output: &Path) -> Result<usize> {
        log::debug!("running sort pass over {}", input.display());
        let mut reader = Reader::open(input)?;
        self.check_types(&reader)?;

        let header = header_len(&self.key_type, &self.value_type);
        let mut buffer = SortBuffer::new(self.memory / 4);
        let mut out: Option<PendingFile> = None;
        let mut segments = 0;
        let mut at_eof = false;

        while !at_eof {
            buffer.reset();
            while !buffer.is_full() {
                if !buffer.push_from(&mut reader)? {
                    at_eof = true;
                    break;
                }
            }
            at_eof = at_eof || reader.is_exhausted();

            let order = buffer.sorted_order(&self.comparator)?;

            // a single run goes straight to the output, otherwise runs are collected in an intermediate file
            let single = segments == 0 && at_eof;
            let file = match &mut out {
                Some(out) => out,
                None => {
                    let path = if single {
                        output.to_path_buf()
                    } else {
                        segment::pass_path(output, 0)
                    };
                    out.insert(PendingFile::create(path)?)
                }
            }
            .file();

            log::debug!(
                "flushing segment {} ({} records, {} bytes)",
                segments,
                buffer.len(),
                buffer.byte_len()
            );
            if !single {
                let records_len = (buffer.byte_len() + 8 * buffer.len()) as u64;
                segment::write_prefix(file, header + records_len)?;
            }
            let mut writer = Writer::new(&mut *file, &self.key_type, &self.value_type)?;
            for idx in order {
                let (record, key_len) = buffer.record(idx);
                writer.append_raw(record, key_len)?;
            }
            segments += 1;
        }

        if let Some(out) = out {
            out.finish()?;
        }

        log::info!("sort pass produced {} segments", segments);
        return Ok(segments);
    }

    fn merge_pass(&self, output: &Path, pass: usize, last: bool) -> Result<usize> {
        let input = ScratchFile::new(segment::pass_path(output, pass - 1));
        let out_path = if last {
            output.to_path_buf()
        } else {
            segment::pass_path(output, pass)
        };
        log::debug!(
            "running merge pass {} ({} -> {}, final: {})",
            pass,
            input.path().display(),
            out_path.display(),
            last
        );

        let mut out = PendingFile::create(out_path)?;
        let mut cursor = SegmentCursor::open(input.path())?;
        let header = header_len(&self.key_type, &self.value_type);
        let buf_size = self.merge_buffer_size(self.factor);
        let mut segments = 0;

        loop {
            let mut queue = MergeQueue::with_capacity(&self.comparator, self.factor);
            let mut records_len = 0;
            let mut inputs = 0;
            while inputs < self.factor {
                let next = match cursor.next_segment()? {
                    Some(next) => next,
                    None => break,
                };
                let reader = next.open(input.path(), buf_size)?;
                records_len += reader.end() - reader.position();
                queue.push(reader)?;
                inputs += 1;
            }
            if inputs == 0 {
                break;
            }

            log::trace!("merging segment {} of pass {} ({} inputs)", segments, pass, inputs);
            if !last {
                segment::write_prefix(out.file(), header + records_len)?;
            }
            let mut writer = Writer::new(out.file(), &self.key_type, &self.value_type)?;
            queue.merge_into(&mut writer)?;
            segments += 1;
        }

        out.finish()?;

        return Ok(segments);
    }

    fn merge_buffer_size(&self, inputs: usize) -> usize {
        cmp::max(self.memory / (inputs + 1), MIN_BUFFER_SIZE)
    }

    fn check_types(&self, reader: &Reader) -> Result<()> {
        for (expected, found) in [
            (&self.key_type, reader.key_type()),
            (&self.value_type, reader.value_type()),
        ] {
            if expected != found {
                return Err(SeqFileError::TypeMismatch {
                    expected: expected.clone(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }
}
