//! Record codec contract and built-in record types.
//!
//! Keys and values stored in a sequence file implement [`Writable`]: they serialize themselves to a byte sink
//! and restore their state in place from a byte source, so a single instance can be reused across reads.

use std::fmt;
use std::io::{self, prelude::*};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SeqFileError};

/// Record codec interface.
pub trait Writable: fmt::Debug {
    /// Stable type name recorded in file headers.
    fn type_name(&self) -> &'static str;

    /// Serializes the record to `out`.
    fn write_to(&self, out: &mut dyn Write) -> Result<()>;

    /// Restores the record state from `input`, replacing the current one.
    fn read_from(&mut self, input: &mut dyn Read) -> Result<()>;
}

/// 32-bit signed integer, 4 bytes big-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Int(pub i32);

impl Writable for Int {
    fn type_name(&self) -> &'static str {
        "int"
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        out.write_i32::<BigEndian>(self.0)?;
        return Ok(());
    }

    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        self.0 = input.read_i32::<BigEndian>()?;
        return Ok(());
    }
}

/// 64-bit signed integer, 8 bytes big-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Long(pub i64);

impl Writable for Long {
    fn type_name(&self) -> &'static str {
        "long"
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        out.write_i64::<BigEndian>(self.0)?;
        return Ok(());
    }

    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        self.0 = input.read_i64::<BigEndian>()?;
        return Ok(());
    }
}

/// UTF-8 string prefixed with its byte length as a big-endian `u16`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Text(pub String);

impl Text {
    pub fn new(value: impl Into<String>) -> Self {
        Text(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Writable for Text {
    fn type_name(&self) -> &'static str {
        "text"
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let len = u16::try_from(self.0.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("string of {} bytes exceeds the u16 length prefix", self.0.len()),
            )
        })?;
        out.write_u16::<BigEndian>(len)?;
        out.write_all(self.0.as_bytes())?;

        return Ok(());
    }

    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        let len = input.read_u16::<BigEndian>()? as usize;
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.clear();
        bytes.resize(len, 0);
        input.read_exact(&mut bytes)?;
        self.0 = String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        return Ok(());
    }
}

/// Raw byte string prefixed with its length as a big-endian `i32`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Writable for Bytes {
    fn type_name(&self) -> &'static str {
        "bytes"
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let len = i32::try_from(self.0.len())
            .map_err(|_| SeqFileError::CorruptRecord(format!("byte string of {} bytes is too long", self.0.len())))?;
        out.write_i32::<BigEndian>(len)?;
        out.write_all(&self.0)?;

        return Ok(());
    }

    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        let len = input.read_i32::<BigEndian>()?;
        if len < 0 {
            return Err(SeqFileError::CorruptRecord(format!("negative byte string length {}", len)));
        }
        self.0.clear();
        self.0.resize(len as usize, 0);
        input.read_exact(&mut self.0)?;

        return Ok(());
    }
}

/// Empty record. Serializes to zero bytes, so it can only be used as a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Null;

impl Writable for Null {
    fn type_name(&self) -> &'static str {
        "null"
    }

    fn write_to(&self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn read_from(&mut self, _input: &mut dyn Read) -> Result<()> {
        Ok(())
    }
}

/// Record decorator that prefixes the wrapped record with a version byte.
///
/// Reading a record written with a different version fails with [`SeqFileError::VersionMismatch`], which
/// callers can match on to skip or convert records of an older layout. The decorated record is recorded under
/// its own type name, distinct from the wrapped one since the two layouts differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    type_name: &'static str,
    version: u8,
    inner: T,
}

impl<T> Versioned<T> {
    /// # Arguments
    /// * `type_name` - Type name recorded in file headers for the decorated record
    /// * `version` - Version byte written before the record
    /// * `inner` - Wrapped record
    pub fn new(type_name: &'static str, version: u8, inner: T) -> Self {
        Versioned {
            type_name,
            version,
            inner,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Writable> Writable for Versioned<T> {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        out.write_u8(self.version)?;
        self.inner.write_to(out)
    }

    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        let found = input.read_u8()?;
        if found != self.version {
            return Err(SeqFileError::VersionMismatch {
                expected: self.version,
                found,
            });
        }
        self.inner.read_from(input)
    }
}

/// `serde` type stored through [`Rmp`].
pub trait RmpRecord: fmt::Debug + Serialize + DeserializeOwned {
    /// Type name recorded in file headers. Must stay the same for as long as files holding the type exist.
    const TYPE_NAME: &'static str;
}

/// Adapter storing any `serde` type as a MessagePack encoded record.
/// For more information see https://msgpack.org/.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rmp<T>(pub T);

impl<T: RmpRecord> Writable for Rmp<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn write_to(&self, mut out: &mut dyn Write) -> Result<()> {
        rmp_serde::encode::write(&mut out, &self.0)?;
        return Ok(());
    }

    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        self.0 = rmp_serde::decode::from_read(input)?;
        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use rstest::*;

    use super::{Bytes, Int, Long, Null, Rmp, RmpRecord, Text, Versioned, Writable};
    use crate::error::SeqFileError;
    use crate::writer::Writer;

    fn serialize(record: &dyn Writable) -> Vec<u8> {
        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();
        out
    }

    #[rstest]
    #[case(&Int(-2), vec![0xff, 0xff, 0xff, 0xfe])]
    #[case(&Long(1), vec![0, 0, 0, 0, 0, 0, 0, 1])]
    #[case(&Text::new("ab"), vec![0, 2, b'a', b'b'])]
    #[case(&Bytes(vec![7]), vec![0, 0, 0, 1, 7])]
    #[case(&Null, vec![])]
    fn test_builtin_layout(#[case] record: &dyn Writable, #[case] expected: Vec<u8>) {
        assert_eq!(serialize(record), expected);
    }

    #[test]
    fn test_read_reuses_instance() {
        let mut text = Text::new("a much longer previous value");
        text.read_from(&mut Cursor::new(serialize(&Text::new("xy")))).unwrap();
        assert_eq!(text.as_str(), "xy");

        let mut bytes = Bytes(vec![1, 2, 3, 4]);
        bytes.read_from(&mut Cursor::new(serialize(&Bytes(vec![9])))).unwrap();
        assert_eq!(bytes, Bytes(vec![9]));
    }

    #[test]
    fn test_negative_bytes_length() {
        let mut bytes = Bytes::default();
        let result = bytes.read_from(&mut Cursor::new(vec![0xff, 0xff, 0xff, 0xff]));
        assert!(matches!(result, Err(SeqFileError::CorruptRecord(_))));
    }

    #[test]
    fn test_versioned() {
        let data = serialize(&Versioned::new("versioned.int", 2, Int(5)));
        assert_eq!(data, vec![2, 0, 0, 0, 5]);

        let mut restored = Versioned::new("versioned.int", 2, Int::default());
        restored.read_from(&mut Cursor::new(data.clone())).unwrap();
        assert_eq!(restored.get(), &Int(5));

        let mut newer = Versioned::new("versioned.int", 3, Int::default());
        let result = newer.read_from(&mut Cursor::new(data));
        assert!(matches!(
            result,
            Err(SeqFileError::VersionMismatch { expected: 3, found: 2 })
        ));
    }

    #[derive(Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Person {
        name: String,
        age: u8,
    }

    impl RmpRecord for Person {
        const TYPE_NAME: &'static str = "person";
    }

    #[test]
    fn test_rmp() {
        let person = Rmp(Person {
            name: "Ada".to_string(),
            age: 36,
        });
        let mut data = serialize(&person);
        let len = data.len();
        data.extend_from_slice(&[0xaa, 0xbb]);

        let mut cursor = Cursor::new(data);
        let mut restored = Rmp::<Person>::default();
        restored.read_from(&mut cursor).unwrap();

        assert_eq!(restored, person);
        assert_eq!(cursor.position(), len as u64);
    }

    #[test]
    fn test_wrapped_type_names() {
        let mut writer = Writer::new(Vec::new(), "int", "int").unwrap();
        assert!(matches!(
            writer.append(&Versioned::new("versioned.int", 2, Int(5)), &Int(1)),
            Err(SeqFileError::TypeMismatch { .. })
        ));
        assert!(writer.is_empty());

        let mut writer = Writer::new(Vec::new(), "versioned.int", "int").unwrap();
        writer.append(&Versioned::new("versioned.int", 2, Int(5)), &Int(1)).unwrap();

        let person = Rmp(Person {
            name: "Ada".to_string(),
            age: 36,
        });
        assert_eq!(person.type_name(), "person");
        let data = Writer::new(Vec::new(), person.type_name(), "int").unwrap().into_inner();
        assert_eq!(&data[4..], &[0, 6, b'p', b'e', b'r', b's', b'o', b'n', 0, 3, b'i', b'n', b't']);

        let mut writer = Writer::new(Vec::new(), "person", "int").unwrap();
        writer.append(&person, &Int(1)).unwrap();
        assert!(matches!(writer.append(&Int(1), &Int(1)), Err(SeqFileError::TypeMismatch { .. })));
    }
}
