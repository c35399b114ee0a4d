//! `seq-file` is a binary key/value container format with an external sort/merge engine.
//!
//! A sequence file is a header naming the key and value types followed by length-prefixed records. Records are
//! sorted by comparing their serialized keys directly, so files much larger than the main memory can be sorted
//! without deserializing a single record. Sorting runs in passes: the sort pass cuts the input into runs that fit
//! in memory and sorts each of them, merge passes combine up to `factor` runs at a time until one remains. For
//! more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `seq-file` supports the following features:
//!
//! * **Raw comparison:**
//!   keys are compared as bytes using a [`RawComparator`]. Built-in record types come with byte-level
//!   comparators, any other key type is compared by its natural order.
//! * **Stable sorting:**
//!   records with equal keys keep their input order, across merges too.
//! * **Bounded resources:**
//!   the memory budget and the merge fan-in limit memory consumption and the number of open files.
//! * **Custom record types:**
//!   implement [`Writable`] or wrap a `serde` type implementing [`record::RmpRecord`] into [`record::Rmp`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use seq_file::record::{Int, Text};
//! use seq_file::{Reader, SorterBuilder, Writer};
//!
//! fn main() {
//!     let mut writer = Writer::create_for::<Int, Text>(Path::new("input.seq")).unwrap();
//!     for (key, value) in [(3, "c"), (1, "a"), (2, "b")] {
//!         writer.append(&Int(key), &Text::new(value)).unwrap();
//!     }
//!     writer.close().unwrap();
//!
//!     let sorter = SorterBuilder::<seq_file::NaturalComparator<Int>>::natural::<Text>()
//!         .with_memory(50 * 1024 * 1024)
//!         .build();
//!     sorter.sort(Path::new("input.seq"), Path::new("output.seq")).unwrap();
//!
//!     let mut reader = Reader::open(Path::new("output.seq")).unwrap();
//!     let (mut key, mut value) = (Int::default(), Text::default());
//!     while reader.next(&mut key, &mut value).unwrap() {
//!         println!("{} {}", key.0, value.as_str());
//!     }
//! }
//! ```

pub mod buffer;
pub mod compare;
pub mod error;
pub mod file;
pub mod merger;
pub mod reader;
pub mod record;
pub mod registry;
pub mod segment;
pub mod sort;
pub mod writer;

pub use compare::{NaturalComparator, RawComparator};
pub use error::{Result, SeqFileError};
pub use merger::MergeQueue;
pub use reader::Reader;
pub use record::Writable;
pub use registry::Registry;
pub use sort::{SortReport, Sorter, SorterBuilder};
pub use writer::Writer;
