//! Comparators over serialized keys.
//!
//! Sorting and merging move records around as raw bytes and compare keys without deserializing them. A
//! comparator receives the serialized key bytes of two records. Closures of the form
//! `Fn(&[u8], &[u8]) -> Ordering` are comparators too.

use std::cmp::Ordering;
use std::io::Cursor;
use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Result, SeqFileError};
use crate::record::Writable;

/// Serialized key comparator.
pub trait RawComparator {
    /// Compares two serialized keys.
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering>;
}

impl<F> RawComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        Ok(self(key1, key2))
    }
}

/// Default comparator: deserializes both keys and compares them by their natural order.
pub struct NaturalComparator<K> {
    key_type: PhantomData<fn() -> K>,
}

impl<K> NaturalComparator<K> {
    pub fn new() -> Self {
        NaturalComparator { key_type: PhantomData }
    }
}

impl<K> Default for NaturalComparator<K> {
    fn default() -> Self {
        NaturalComparator::new()
    }
}

impl<K> Clone for NaturalComparator<K> {
    fn clone(&self) -> Self {
        NaturalComparator::new()
    }
}

impl<K> RawComparator for NaturalComparator<K>
where
    K: Writable + Ord + Default,
{
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        let mut first = K::default();
        first.read_from(&mut Cursor::new(key1))?;
        let mut second = K::default();
        second.read_from(&mut Cursor::new(key2))?;

        return Ok(first.cmp(&second));
    }
}

/// Compares whole keys as unsigned byte strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicComparator;

impl RawComparator for LexicographicComparator {
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        Ok(key1.cmp(key2))
    }
}

fn fixed<'a>(key: &'a [u8], width: usize, type_name: &str) -> Result<&'a [u8]> {
    if key.len() != width {
        return Err(SeqFileError::CorruptRecord(format!(
            "{} key has {} bytes, expected {}",
            type_name,
            key.len(),
            width
        )));
    }
    Ok(key)
}

fn prefixed<'a>(key: &'a [u8], prefix: usize, type_name: &str) -> Result<&'a [u8]> {
    if key.len() < prefix {
        return Err(SeqFileError::CorruptRecord(format!(
            "{} key has {} bytes, shorter than its length prefix",
            type_name,
            key.len()
        )));
    }
    Ok(&key[prefix..])
}

/// Compares [`Int`](crate::record::Int) keys without deserializing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntComparator;

impl RawComparator for IntComparator {
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        let first = BigEndian::read_i32(fixed(key1, 4, "int")?);
        let second = BigEndian::read_i32(fixed(key2, 4, "int")?);
        Ok(first.cmp(&second))
    }
}

/// Compares [`Long`](crate::record::Long) keys without deserializing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongComparator;

impl RawComparator for LongComparator {
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        let first = BigEndian::read_i64(fixed(key1, 8, "long")?);
        let second = BigEndian::read_i64(fixed(key2, 8, "long")?);
        Ok(first.cmp(&second))
    }
}

/// Compares [`Text`](crate::record::Text) keys by their UTF-8 bytes, skipping the length prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextComparator;

impl RawComparator for TextComparator {
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        Ok(prefixed(key1, 2, "text")?.cmp(prefixed(key2, 2, "text")?))
    }
}

/// Compares [`Bytes`](crate::record::Bytes) keys by their payload, skipping the length prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesComparator;

impl RawComparator for BytesComparator {
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        Ok(prefixed(key1, 4, "bytes")?.cmp(prefixed(key2, 4, "bytes")?))
    }
}

/// Inverts the order of the wrapped comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reversed<C>(pub C);

impl<C: RawComparator> RawComparator for Reversed<C> {
    fn compare(&self, key1: &[u8], key2: &[u8]) -> Result<Ordering> {
        Ok(self.0.compare(key1, key2)?.reverse())
    }
}
