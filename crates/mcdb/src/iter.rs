//! Lazy iterators over a mapped database.
//!
//! Both iterators borrow the reader's mapping and never copy record bytes.
//! They yield `Result` items: a truncated or out-of-bounds record surfaces
//! once as a [`Format`](crate::Error::Format) error, after which the iterator
//! is fused and returns `None`.

use std::iter::FusedIterator;

use crate::error::{Error, Result};
use crate::format::{Header, HEADER_BYTES, PAD_ALIGN};
use crate::probe::Probe;
use crate::record::{self, RecordRef, RECORD_HEADER_BYTES};

/// Full scan over every record, in build order.
///
/// Created by [`Reader::iter`](crate::Reader::iter). Restart a scan by
/// calling `iter` again; iterators are independent of each other and of the
/// reader's `find_key`/`find_next` cursor.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    data: &'a [u8],
    pos: u64,
    end: u64,
    done: bool,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(data: &'a [u8], header: &Header) -> Self {
        Self {
            data,
            pos: HEADER_BYTES as u64,
            end: header.data_end(),
            done: false,
        }
    }

    /// Next record along with its offset.
    pub(crate) fn next_record(&mut self) -> Option<Result<RecordRef<'a>>> {
        if self.done || self.pos + RECORD_HEADER_BYTES > self.end {
            self.done = true;
            return None;
        }
        match record::decode_header(self.data, self.pos, self.end) {
            // A length of all ones in the last alignment unit is the padding.
            Ok((u32::MAX, _)) if self.end - self.pos < PAD_ALIGN => {
                self.done = true;
                return None;
            }
            Ok((u32::MAX, _)) => {
                self.done = true;
                return Some(Err(Error::format(
                    self.pos,
                    "padding marker inside the record region",
                )));
            }
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }
        match record::decode(self.data, self.pos, self.end) {
            Ok(rec) => {
                self.pos = rec.next_offset();
                Some(Ok(rec))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().map(|r| r.map(|rec| (rec.key, rec.value)))
    }
}

impl FusedIterator for Iter<'_> {}

/// Values of every occurrence of one key, in build order.
///
/// Created by [`Reader::iter_key`](crate::Reader::iter_key). Walks the key's
/// probe sequence in the index rather than scanning the record region.
#[derive(Debug, Clone)]
pub struct Occurrences<'a, 'k> {
    data: &'a [u8],
    header: &'a Header,
    key: &'k [u8],
    probe: Option<Probe>,
}

impl<'a, 'k> Occurrences<'a, 'k> {
    pub(crate) fn new(data: &'a [u8], header: &'a Header, key: &'k [u8]) -> Self {
        Self {
            data,
            header,
            key,
            probe: Probe::start(header, key),
        }
    }
}

impl<'a> Iterator for Occurrences<'a, '_> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let probe = self.probe.as_mut()?;
        match probe.next(self.data, self.header, self.key) {
            Ok(Some(hit)) => Some(Ok(hit.value(self.data))),
            Ok(None) => {
                self.probe = None;
                None
            }
            Err(e) => {
                self.probe = None;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Occurrences<'_, '_> {}
