//! # mcdb - memory-mapped constant database
//!
//! Immutable key/value files with a hash index, built once by a [`Builder`]
//! and then read by any number of [`Reader`]s through a shared read-only
//! memory mapping.
//!
//! Keys need not be unique: a database is a *multiset* of records, and the
//! occurrences of one key keep the order in which they were added. Lookups
//! cost one hash and, on average, about one slot probe; they return slices
//! into the mapping and allocate nothing.
//!
//! A database is never modified in place. To change it, build a new one at
//! the same path; [`Builder::finish`] renames the finished file over the old
//! one, so readers see either the complete old file or the complete new one.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (4096 bytes)                                           │
//! │                                                               │
//! │ 256 x [hpos (u64) | hslots (u32) | reserved (u32)]            │
//! │ one descriptor per bucket; bucket = hash & 0xff               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ RECORDS (build order)                                         │
//! │                                                               │
//! │ klen (u32) | dlen (u32) | key | value                         │
//! │ ... repeated for each record ...                              │
//! │ 0xff padding up to a 16-byte boundary                         │
//! ├───────────────────────────────────────────────────────────────┤
//! │ SLOT TABLES (bucket 0 .. bucket 255, contiguous)              │
//! │                                                               │
//! │ hslots x [hash (u32) | dpos (u32)]          narrow form       │
//! │ hslots x [hash (u32) | klen (u32) | dpos (u64)]   wide form   │
//! │ a slot with dpos == 0 is empty                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. Each bucket's table has twice as many slots
//! as records in the bucket. A key is placed by linear probing from slot
//! `(hash >> 8) % hslots`, wrapping at the end of the table. The wide form is
//! only used when the record region reaches 4 GiB.
//!
//! The hash is djb's `h = ((h << 5) + h) ^ c` starting at 5381 (see the
//! [`hash`] crate), so files are bit-identical across implementations.

#![deny(unsafe_code)]

mod builder;
mod error;
pub mod format;
mod iter;
pub mod makefmt;
mod probe;
mod reader;
mod record;

pub use builder::{BuildState, Builder};
pub use config::{Advice, BuildConfig, DEFAULT_MODE};
pub use error::{Error, ErrorKind, Result};
pub use iter::{Iter, Occurrences};
pub use reader::{Reader, Stats, STAT_DISTANCES};

#[cfg(test)]
mod tests;
