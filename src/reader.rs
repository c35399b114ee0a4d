//! Sequence file reader.

use std::io::{self, prelude::*, Cursor};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};

use crate::buffer::DataBuffer;
use crate::error::{Result, SeqFileError};
use crate::file::{BufferedFileReader, DEFAULT_BUFFER_SIZE};
use crate::record::{Text, Writable};
use crate::registry::Registry;
use crate::writer::{MAGIC, VERSION};

/// Reads key/value records from a sequence file, or from a byte range of one.
pub struct Reader {
    path: PathBuf,
    input: BufferedFileReader,
    key_type: String,
    value_type: String,
    end: u64,
    scratch: DataBuffer,
}

impl Reader {
    /// Opens a sequence file with the default buffer size.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_buffer(path, DEFAULT_BUFFER_SIZE)
    }

    /// Opens a sequence file.
    pub fn open_with_buffer(path: &Path, buf_size: usize) -> Result<Self> {
        let input = BufferedFileReader::with_capacity(path, buf_size)?;
        let end = input.len();

        Self::init(path, input, end)
    }

    /// Opens the sequence file stored in `len` bytes at offset `start` of a larger file.
    /// The range covers the header and the records; reading stops at `start + len`.
    ///
    /// # Arguments
    /// * `path` - File holding the range
    /// * `buf_size` - Read buffer size
    /// * `start` - Offset of the range header
    /// * `len` - Range length in bytes
    pub fn open_range(path: &Path, buf_size: usize, start: u64, len: u64) -> Result<Self> {
        let mut input = BufferedFileReader::with_capacity(path, buf_size)?;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= input.len())
            .ok_or_else(|| {
                SeqFileError::CorruptRecord(format!(
                    "range {}+{} exceeds the {} bytes of {}",
                    start,
                    len,
                    input.len(),
                    path.display()
                ))
            })?;
        input.seek_to(start)?;

        Self::init(path, input, end)
    }

    fn init(path: &Path, mut input: BufferedFileReader, end: u64) -> Result<Self> {
        let mut header = [0u8; 4];
        input.read_exact(&mut header)?;
        if header[..3] != MAGIC {
            return Err(SeqFileError::CorruptHeader(format!(
                "{} is not a sequence file",
                path.display()
            )));
        }
        if header[3] != VERSION {
            return Err(SeqFileError::VersionMismatch {
                expected: VERSION,
                found: header[3],
            });
        }

        let mut key_type = Text::default();
        key_type.read_from(&mut input)?;
        let mut value_type = Text::default();
        value_type.read_from(&mut input)?;

        if input.position() > end {
            return Err(SeqFileError::CorruptHeader(format!(
                "header of {} runs past the end of its range",
                path.display()
            )));
        }

        return Ok(Reader {
            path: path.to_path_buf(),
            input,
            key_type: key_type.0,
            value_type: value_type.0,
            end,
            scratch: DataBuffer::new(),
        });
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the type name recorded for keys.
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// Returns the type name recorded for values.
    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Rewrites the recorded type names to their current registered names, following renames.
    pub fn resolve_types(&mut self, registry: &Registry) {
        if let Some(name) = registry.canonical_name(&self.key_type) {
            self.key_type = name.to_string();
        }
        if let Some(name) = registry.canonical_name(&self.value_type) {
            self.value_type = name.to_string();
        }
    }

    /// Creates an empty key of the recorded key type.
    pub fn new_key(&self, registry: &Registry) -> Result<Box<dyn Writable>> {
        registry.create(&self.key_type)
    }

    /// Creates an empty value of the recorded value type.
    pub fn new_value(&self, registry: &Registry) -> Result<Box<dyn Writable>> {
        registry.create(&self.value_type)
    }

    /// Returns the offset where reading stops.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Returns the current read offset.
    pub fn position(&self) -> u64 {
        self.input.position()
    }

    /// Checks if every record up to the end of the range was read.
    pub fn is_exhausted(&self) -> bool {
        self.input.position() >= self.end
    }

    /// Moves the read offset. `pos` must be the offset of a record.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.input.seek_to(pos)?;
        return Ok(());
    }

    /// Appends the next raw record (key bytes followed by value bytes) to `buffer` without deserializing it.
    /// Returns the key length, or `None` at the end of the range.
    pub fn next_raw(&mut self, buffer: &mut DataBuffer) -> Result<Option<usize>> {
        read_raw(&mut self.input, self.end, buffer)
    }

    /// Reads the next key into `key`, skipping its value.
    /// Returns `false` at the end of the range.
    pub fn next_key(&mut self, key: &mut dyn Writable) -> Result<bool> {
        check_type(&self.key_type, key)?;

        self.scratch.reset();
        let key_len = match read_raw(&mut self.input, self.end, &mut self.scratch)? {
            Some(key_len) => key_len,
            None => return Ok(false),
        };

        decode(key, self.scratch.data(), key_len)?;

        return Ok(true);
    }

    /// Reads the next key and value into `key` and `value`.
    /// Returns `false` at the end of the range.
    ///
    /// Fails with [`SeqFileError::UnderOrOverRead`] if a record codec does not consume exactly the bytes the
    /// record framing holds for it.
    pub fn next(&mut self, key: &mut dyn Writable, value: &mut dyn Writable) -> Result<bool> {
        check_type(&self.key_type, key)?;
        check_type(&self.value_type, value)?;

        self.scratch.reset();
        let key_len = match read_raw(&mut self.input, self.end, &mut self.scratch)? {
            Some(key_len) => key_len,
            None => return Ok(false),
        };

        let record = self.scratch.data();
        decode(key, record, key_len)?;
        decode(value, &record[key_len..], record.len() - key_len)?;

        return Ok(true);
    }

    /// Releases the file.
    pub fn close(self) {}
}

fn read_raw(input: &mut BufferedFileReader, end: u64, buffer: &mut DataBuffer) -> Result<Option<usize>> {
    if input.position() >= end {
        return Ok(None);
    }

    let len = input.read_i32::<BigEndian>()?;
    let key_len = input.read_i32::<BigEndian>()?;
    if key_len <= 0 || len < key_len {
        return Err(SeqFileError::CorruptRecord(format!(
            "record at offset {} has length {} and key length {}",
            input.position() - 8,
            len,
            key_len
        )));
    }
    if input.position() + len as u64 > end {
        return Err(SeqFileError::CorruptRecord(format!(
            "record at offset {} runs past the end of its range",
            input.position() - 8
        )));
    }
    buffer.write_from(input, len as usize)?;

    return Ok(Some(key_len as usize));
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

/// Decodes `record` from `data`, which holds `expected` bytes for it followed by any trailing bytes of the
/// record. A codec running out of `data` is reported as reading one byte more than available.
fn decode(record: &mut dyn Writable, data: &[u8], expected: usize) -> Result<()> {
    let mut cursor = Cursor::new(data);
    let read = match record.read_from(&mut cursor) {
        Ok(()) => cursor.position(),
        Err(err) if is_truncated(&err) => data.len() as u64 + 1,
        Err(err) => return Err(err),
    };

    if read != expected as u64 {
        return Err(SeqFileError::UnderOrOverRead {
            type_name: record.type_name().to_string(),
            read,
            expected: expected as u64,
        });
    }
    Ok(())
}

fn is_truncated(err: &SeqFileError) -> bool {
    use rmp_serde::decode::Error::{InvalidDataRead, InvalidMarkerRead};

    match err {
        SeqFileError::IO(err) => err.kind() == io::ErrorKind::UnexpectedEof,
        SeqFileError::Deserialization(InvalidMarkerRead(err) | InvalidDataRead(err)) => {
            err.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::prelude::*;

    use byteorder::{BigEndian, WriteBytesExt};
    use rstest::*;

    use super::Reader;
    use crate::buffer::DataBuffer;
    use crate::error::{Result, SeqFileError};
    use crate::record::{Int, Long, Null, Text, Writable};
    use crate::registry::Registry;
    use crate::writer::{header_len, Writer};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_file(path: &std::path::Path, records: &[(i32, &str)]) {
        let mut writer = Writer::create_for::<Int, Text>(path).unwrap();
        for &(key, value) in records {
            writer.append(&Int(key), &Text::new(value)).unwrap();
        }
        writer.close().unwrap();
    }

    #[rstest]
    fn test_round_trip(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        let records = vec![(5, "five"), (-1, ""), (5, "again"), (1000, "long value")];
        write_file(&path, &records);

        let mut reader = Reader::open(&path).unwrap();
        assert_eq!(reader.key_type(), "int");
        assert_eq!(reader.value_type(), "text");

        let (mut key, mut value) = (Int::default(), Text::default());
        let mut restored = Vec::new();
        while reader.next(&mut key, &mut value).unwrap() {
            restored.push((key.0, value.0.clone()));
        }
        assert!(reader.is_exhausted());
        assert!(!reader.next(&mut key, &mut value).unwrap());

        let expected = Vec::from_iter(records.iter().map(|&(k, v)| (k, v.to_string())));
        assert_eq!(restored, expected);
    }

    #[rstest]
    fn test_keys_and_seek(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        write_file(&path, &[(1, "a"), (2, "bb"), (3, "ccc")]);

        let mut reader = Reader::open(&path).unwrap();
        let mut key = Int::default();
        assert!(reader.next_key(&mut key).unwrap());
        let second = reader.position();
        assert!(reader.next_key(&mut key).unwrap());
        assert_eq!(key, Int(2));

        reader.seek(second).unwrap();
        let mut value = Text::default();
        assert!(reader.next(&mut key, &mut value).unwrap());
        assert_eq!((key, value.as_str()), (Int(2), "bb"));
    }

    #[rstest]
    fn test_next_raw(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        write_file(&path, &[(7, "x"), (8, "yz")]);

        let mut reader = Reader::open(&path).unwrap();
        let mut buffer = DataBuffer::new();
        assert_eq!(reader.next_raw(&mut buffer).unwrap(), Some(4));
        assert_eq!(reader.next_raw(&mut buffer).unwrap(), Some(4));
        assert_eq!(reader.next_raw(&mut buffer).unwrap(), None);
        assert_eq!(buffer.data(), &[0, 0, 0, 7, 0, 1, b'x', 0, 0, 0, 8, 0, 2, b'y', b'z']);
    }

    #[rstest]
    fn test_range(tmp_dir: tempfile::TempDir) {
        let first = tmp_dir.path().join("first.seq");
        let second = tmp_dir.path().join("second.seq");
        write_file(&first, &[(1, "a")]);
        write_file(&second, &[(2, "b"), (3, "c")]);

        let head = fs::read(&first).unwrap();
        let tail = fs::read(&second).unwrap();
        let combined = tmp_dir.path().join("combined");
        fs::write(&combined, [&head[..], &tail[..]].concat()).unwrap();

        let mut reader = Reader::open_range(&combined, 4096, 0, head.len() as u64).unwrap();
        let mut key = Int::default();
        assert!(reader.next_key(&mut key).unwrap());
        assert_eq!(key, Int(1));
        assert!(!reader.next_key(&mut key).unwrap());

        let mut reader = Reader::open_range(&combined, 4096, head.len() as u64, tail.len() as u64).unwrap();
        let mut keys = Vec::new();
        while reader.next_key(&mut key).unwrap() {
            keys.push(key.0);
        }
        assert_eq!(keys, vec![2, 3]);

        let result = Reader::open_range(&combined, 4096, head.len() as u64, tail.len() as u64 + 1);
        assert!(matches!(result, Err(SeqFileError::CorruptRecord(_))));
    }

    #[rstest]
    fn test_bad_header(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        write_file(&path, &[(1, "a")]);
        let mut data = fs::read(&path).unwrap();

        data[3] = 9;
        fs::write(&path, &data).unwrap();
        assert!(matches!(
            Reader::open(&path),
            Err(SeqFileError::VersionMismatch { expected: 1, found: 9 })
        ));

        data[0] = b'X';
        fs::write(&path, &data).unwrap();
        assert!(matches!(Reader::open(&path), Err(SeqFileError::CorruptHeader(_))));
    }

    #[rstest]
    fn test_type_mismatch(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        write_file(&path, &[(1, "a")]);

        let mut reader = Reader::open(&path).unwrap();
        let mut key = Long::default();
        assert!(matches!(reader.next_key(&mut key), Err(SeqFileError::TypeMismatch { .. })));
        let (mut key, mut value) = (Int::default(), Int::default());
        assert!(matches!(reader.next(&mut key, &mut value), Err(SeqFileError::TypeMismatch { .. })));
    }

    /// Record whose codec writes one byte more than it reads back.
    #[derive(Debug, Default)]
    struct Sloppy(u8);

    impl Writable for Sloppy {
        fn type_name(&self) -> &'static str {
            "sloppy"
        }

        fn write_to(&self, out: &mut dyn Write) -> Result<()> {
            out.write_u8(self.0)?;
            out.write_u8(0)?;
            Ok(())
        }

        fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
            let mut byte = [0u8; 1];
            input.read_exact(&mut byte)?;
            self.0 = byte[0];
            Ok(())
        }
    }

    #[rstest]
    fn test_under_read(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        let mut writer = Writer::create(&path, "int", "sloppy").unwrap();
        writer.append(&Int(1), &Sloppy(4)).unwrap();
        writer.append(&Int(2), &Sloppy(5)).unwrap();
        writer.close().unwrap();

        let mut reader = Reader::open(&path).unwrap();
        let (mut key, mut value) = (Int::default(), Sloppy::default());
        assert!(matches!(
            reader.next(&mut key, &mut value),
            Err(SeqFileError::UnderOrOverRead { read: 1, expected: 2, .. })
        ));

        // the key alone decodes fine
        assert!(reader.next_key(&mut key).unwrap());
        assert_eq!(key, Int(2));
    }

    /// Record whose codec writes one byte and reads two.
    #[derive(Debug, Default)]
    struct Greedy(u8);

    impl Writable for Greedy {
        fn type_name(&self) -> &'static str {
            "greedy"
        }

        fn write_to(&self, out: &mut dyn Write) -> Result<()> {
            out.write_u8(self.0)?;
            Ok(())
        }

        fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
            let mut bytes = [0u8; 2];
            input.read_exact(&mut bytes)?;
            self.0 = bytes[0];
            Ok(())
        }
    }

    #[rstest]
    fn test_over_read(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("values.seq");
        let mut writer = Writer::create(&path, "int", "greedy").unwrap();
        writer.append(&Int(1), &Greedy(4)).unwrap();
        writer.close().unwrap();

        let mut reader = Reader::open(&path).unwrap();
        let (mut key, mut value) = (Int::default(), Greedy::default());
        assert!(matches!(
            reader.next(&mut key, &mut value),
            Err(SeqFileError::UnderOrOverRead { read: 2, expected: 1, ref type_name }) if type_name == "greedy"
        ));

        let path = tmp_dir.path().join("keys.seq");
        let mut writer = Writer::create(&path, "greedy", "null").unwrap();
        writer.append(&Greedy(1), &Null).unwrap();
        writer.append(&Greedy(2), &Null).unwrap();
        writer.close().unwrap();

        let mut reader = Reader::open(&path).unwrap();
        let mut key = Greedy::default();
        assert!(matches!(
            reader.next_key(&mut key),
            Err(SeqFileError::UnderOrOverRead { read: 2, expected: 1, .. })
        ));
        assert!(matches!(
            reader.next(&mut key, &mut Null),
            Err(SeqFileError::UnderOrOverRead { read: 2, expected: 1, .. })
        ));
    }

    #[rstest]
    fn test_corrupt_record(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        write_file(&path, &[]);
        let mut data = fs::read(&path).unwrap();
        assert_eq!(data.len() as u64, header_len("int", "text"));

        data.write_i32::<BigEndian>(4).unwrap();
        data.write_i32::<BigEndian>(0).unwrap();
        data.write_all(&[0, 0, 0, 0]).unwrap();
        fs::write(&path, &data).unwrap();

        let mut reader = Reader::open(&path).unwrap();
        assert!(matches!(
            reader.next_raw(&mut DataBuffer::new()),
            Err(SeqFileError::CorruptRecord(_))
        ));
    }

    #[rstest]
    fn test_registry_instances(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("data.seq");
        let mut writer = Writer::create(&path, "legacy.int", "text").unwrap();
        writer.append_raw(&[0, 0, 0, 3, 0, 1, b'c'], 4).unwrap();
        writer.close().unwrap();

        let mut registry = Registry::with_builtins();
        registry.add_alias("legacy.int", "int").unwrap();

        let mut reader = Reader::open(&path).unwrap();
        assert!(matches!(reader.new_key(&Registry::with_builtins()), Err(SeqFileError::UnknownType(_))));

        reader.resolve_types(&registry);
        assert_eq!(reader.key_type(), "int");

        let mut key = reader.new_key(&registry).unwrap();
        let mut value = reader.new_value(&registry).unwrap();
        assert!(reader.next(key.as_mut(), value.as_mut()).unwrap());
        assert_eq!(format!("{:?} {:?}", key, value), "Int(3) Text(\"c\")");
    }
}
