//! Sequence file errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, SeqFileError>;

/// Sequence file error.
#[derive(Debug)]
pub enum SeqFileError {
    /// Output path already exists. Files are never silently overwritten.
    AlreadyExists(PathBuf),
    /// Format or record version differs from the one this build understands.
    VersionMismatch { expected: u8, found: u8 },
    /// File does not start with the sequence file magic bytes.
    CorruptHeader(String),
    /// Record framing is inconsistent (negative or overlapping lengths).
    CorruptRecord(String),
    /// Key serialized to zero bytes.
    EmptyKey(String),
    /// Record type differs from the type declared by the file.
    TypeMismatch { expected: String, found: String },
    /// Record codec consumed a different number of bytes than the record framing holds.
    UnderOrOverRead { type_name: String, read: u64, expected: u64 },
    /// Type name is not known to the registry.
    UnknownType(String),
    /// Data serialization error.
    Serialization(rmp_serde::encode::Error),
    /// Data deserialization error.
    Deserialization(rmp_serde::decode::Error),
    /// Common I/O error.
    IO(io::Error),
}

impl Error for SeqFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SeqFileError::Serialization(err) => Some(err),
            SeqFileError::Deserialization(err) => Some(err),
            SeqFileError::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SeqFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SeqFileError::AlreadyExists(path) => write!(f, "already exists: {}", path.display()),
            SeqFileError::VersionMismatch { expected, found } => {
                write!(f, "version mismatch: expected {}, found {}", expected, found)
            }
            SeqFileError::CorruptHeader(detail) => write!(f, "corrupt header: {}", detail),
            SeqFileError::CorruptRecord(detail) => write!(f, "corrupt record: {}", detail),
            SeqFileError::EmptyKey(type_name) => write!(f, "zero length keys not allowed: {}", type_name),
            SeqFileError::TypeMismatch { expected, found } => {
                write!(f, "wrong record type: {} is not {}", found, expected)
            }
            SeqFileError::UnderOrOverRead {
                type_name,
                read,
                expected,
            } => write!(f, "{} read {} bytes, should read {}", type_name, read, expected),
            SeqFileError::UnknownType(name) => write!(f, "unknown record type: {}", name),
            SeqFileError::Serialization(err) => write!(f, "data serialization error: {}", err),
            SeqFileError::Deserialization(err) => write!(f, "data deserialization error: {}", err),
            SeqFileError::IO(err) => write!(f, "I/O operation failed: {}", err),
        }
    }
}

impl From<io::Error> for SeqFileError {
    fn from(err: io::Error) -> Self {
        SeqFileError::IO(err)
    }
}

impl From<rmp_serde::encode::Error> for SeqFileError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        SeqFileError::Serialization(err)
    }
}

impl From<rmp_serde::decode::Error> for SeqFileError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        SeqFileError::Deserialization(err)
    }
}

impl SeqFileError {
    /// Maps exclusive-create failures onto [`SeqFileError::AlreadyExists`].
    pub(crate) fn from_create(err: io::Error, path: &std::path::Path) -> Self {
        if err.kind() == io::ErrorKind::AlreadyExists {
            SeqFileError::AlreadyExists(path.to_path_buf())
        } else {
            SeqFileError::IO(err)
        }
    }
}
