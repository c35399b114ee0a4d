//! Sequence file writer.
//!
//! File layout:
//!
//! ```text
//! 'S' 'E' 'Q' <version: u8>
//! <key type name: u16 length + UTF-8>
//! <value type name: u16 length + UTF-8>
//! (<record length: i32><key length: i32><key bytes><value bytes>)*
//! ```
//!
//! All integers are big-endian. Keys are never empty.

use std::io::{self, prelude::*};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};

use crate::buffer::DataBuffer;
use crate::error::{Result, SeqFileError};
use crate::file::BufferedFileWriter;
use crate::record::{Text, Writable};

/// Magic bytes every sequence file starts with.
pub const MAGIC: [u8; 3] = *b"SEQ";
/// Format version written after the magic bytes.
pub const VERSION: u8 = 1;

/// Returns the size of a file header declaring the given key and value types.
pub fn header_len(key_type: &str, value_type: &str) -> u64 {
    (MAGIC.len() + 1 + 2 + key_type.len() + 2 + value_type.len()) as u64
}

fn write_header<W: Write>(out: &mut W, key_type: &str, value_type: &str) -> Result<()> {
    out.write_all(&MAGIC)?;
    out.write_u8(VERSION)?;
    Text::new(key_type).write_to(out)?;
    Text::new(value_type).write_to(out)?;

    return Ok(());
}

fn write_record<W: Write>(out: &mut W, record: &[u8], key_len: usize) -> Result<u64> {
    let len = i32::try_from(record.len())
        .map_err(|_| SeqFileError::CorruptRecord(format!("record of {} bytes is too long", record.len())))?;
    out.write_i32::<BigEndian>(len)?;
    out.write_i32::<BigEndian>(key_len as i32)?;
    out.write_all(record)?;

    return Ok(8 + record.len() as u64);
}

/// Appends key/value records to a sequence file.
pub struct Writer<W: Write = BufferedFileWriter> {
    out: W,
    key_type: String,
    value_type: String,
    buffer: DataBuffer,
    written: u64,
}

impl Writer<BufferedFileWriter> {
    /// Creates a new sequence file. Fails with [`SeqFileError::AlreadyExists`] if `path` exists.
    ///
    /// # Arguments
    /// * `path` - File to be created
    /// * `key_type` - Type name of the keys
    /// * `value_type` - Type name of the values
    pub fn create(path: &Path, key_type: &str, value_type: &str) -> Result<Self> {
        let out = BufferedFileWriter::create(path)?;
        log::debug!("creating {} ({} -> {})", path.display(), key_type, value_type);

        Writer::new(out, key_type, value_type)
    }

    /// Creates a new sequence file declaring the types of `K` and `V`.
    pub fn create_for<K, V>(path: &Path) -> Result<Self>
    where
        K: Writable + Default,
        V: Writable + Default,
    {
        Writer::create(path, K::default().type_name(), V::default().type_name())
    }

    /// Flushes buffered records and releases the file.
    pub fn close(self) -> Result<()> {
        self.out.close()?;
        return Ok(());
    }
}

impl<W: Write> Writer<W> {
    /// Starts a sequence file on `out`, writing the header immediately.
    pub fn new(mut out: W, key_type: &str, value_type: &str) -> Result<Self> {
        write_header(&mut out, key_type, value_type)?;

        return Ok(Writer {
            out,
            key_type: key_type.to_string(),
            value_type: value_type.to_string(),
            buffer: DataBuffer::new(),
            written: header_len(key_type, value_type),
        });
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Returns the number of bytes written so far, header included.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == header_len(&self.key_type, &self.value_type)
    }

    /// Appends a key/value record.
    ///
    /// Fails with [`SeqFileError::TypeMismatch`] if a record type differs from the declared one and with
    /// [`SeqFileError::EmptyKey`] if the key serializes to zero bytes. Nothing is written on failure.
    pub fn append(&mut self, key: &dyn Writable, value: &dyn Writable) -> Result<()> {
        check_type(&self.key_type, key)?;
        check_type(&self.value_type, value)?;

        self.buffer.reset();
        key.write_to(&mut self.buffer)?;
        let key_len = self.buffer.len();
        if key_len == 0 {
            return Err(SeqFileError::EmptyKey(key.type_name().to_string()));
        }
        value.write_to(&mut self.buffer)?;

        self.written += write_record(&mut self.out, self.buffer.data(), key_len)?;
        return Ok(());
    }

    /// Appends an already serialized record made of `key_len` key bytes followed by the value bytes.
    pub fn append_raw(&mut self, record: &[u8], key_len: usize) -> Result<()> {
        if key_len == 0 {
            return Err(SeqFileError::EmptyKey(self.key_type.clone()));
        }
        if key_len > record.len() {
            return Err(SeqFileError::CorruptRecord(format!(
                "key length {} exceeds record length {}",
                key_len,
                record.len()
            )));
        }

        self.written += write_record(&mut self.out, record, key_len)?;
        return Ok(());
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn check_type(expected: &str, record: &dyn Writable) -> Result<()> {
    if record.type_name() != expected {
        return Err(SeqFileError::TypeMismatch {
            expected: expected.to_string(),
            found: record.type_name().to_string(),
        });
    }
    Ok(())
}
