//! mcdb binary format constants and header/slot read/write helpers.
//!
//! ## Header (4096 bytes) - 256 bucket descriptors
//!
//! ```text
//! [hpos: u64 BE][hslots: u32 BE][reserved: u32 = 0]   x 256
//! ```
//!
//! ## Slot (one entry of a bucket's open-addressed table)
//!
//! ```text
//! narrow (8 bytes):  [khash: u32 BE][dpos: u32 BE]
//! wide  (16 bytes):  [khash: u32 BE][klen: u32 BE][dpos: u64 BE]
//! ```
//!
//! A slot whose `dpos` is 0 is empty. Offset 0 is inside the header, so no
//! record can ever live there.
//!
//! The wide form is only used when the record region ends at or beyond
//! 4 GiB and a 32-bit `dpos` can no longer address it.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Number of bits of the hash that select a bucket.
pub const BUCKET_BITS: u32 = 8;

/// Number of buckets in the header (`2^BUCKET_BITS`).
pub const BUCKETS: usize = 1 << BUCKET_BITS;

/// Mask selecting the bucket bits of a hash.
pub const BUCKET_MASK: u32 = (BUCKETS as u32) - 1;

/// Size of one bucket descriptor: 8 (`hpos`) + 4 (`hslots`) + 4 (reserved).
pub const BUCKET_DESC_BYTES: usize = 16;

/// Size of the header in bytes (256 * 16 = 4096). Records start here.
pub const HEADER_BYTES: usize = BUCKETS * BUCKET_DESC_BYTES;

/// Slot tables are aligned to this many bytes.
pub const PAD_ALIGN: u64 = 16;

/// Fill byte for the alignment hole between records and slot tables.
/// A record header read from the hole has `klen == u32::MAX`, which marks
/// the end of the record region.
pub const PAD_BYTE: u8 = 0xff;

/// Largest key or value length accepted by the builder.
pub const MAX_FIELD_LEN: u64 = i32::MAX as u64 - 8;

/// Largest number of records in one database.
pub const MAX_RECORDS: u64 = i32::MAX as u64;

/// Returns the bucket index for `hash`.
#[inline]
#[must_use]
pub fn bucket_of(hash: u32) -> usize {
    (hash & BUCKET_MASK) as usize
}

/// Returns the slot where probing for `hash` starts in a table of `hslots`.
///
/// `hslots` must be non-zero.
#[inline]
#[must_use]
pub fn start_slot(hash: u32, hslots: u32) -> u32 {
    (hash >> BUCKET_BITS) % hslots
}

/// Number of padding bytes needed after a record region ending at `pos`.
#[inline]
#[must_use]
pub fn padding_for(pos: u64) -> u64 {
    (PAD_ALIGN - (pos % PAD_ALIGN)) % PAD_ALIGN
}

/// Width of the entries in the slot tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWidth {
    /// 8-byte slots with 32-bit record offsets.
    Narrow,
    /// 16-byte slots with the key length and a 64-bit record offset.
    Wide,
}

impl SlotWidth {
    /// Width a builder must use when the padded record region ends at `data_end`.
    #[must_use]
    pub fn for_data_end(data_end: u64) -> Self {
        if data_end < u64::from(u32::MAX) {
            SlotWidth::Narrow
        } else {
            SlotWidth::Wide
        }
    }

    /// Width of a committed file, from its length and first header bytes.
    ///
    /// The high half of bucket 0's `hpos` is zero exactly when the record
    /// region ended below 4 GiB.
    #[must_use]
    pub fn detect(file_len: u64, header: &[u8]) -> Self {
        if file_len < u64::from(u32::MAX) || BigEndian::read_u32(&header[..4]) == 0 {
            SlotWidth::Narrow
        } else {
            SlotWidth::Wide
        }
    }

    /// Size of one slot in bytes.
    #[inline]
    #[must_use]
    pub fn bytes(self) -> u64 {
        1 << self.shift()
    }

    /// `log2` of the slot size.
    #[inline]
    #[must_use]
    pub fn shift(self) -> u32 {
        match self {
            SlotWidth::Narrow => 3,
            SlotWidth::Wide => 4,
        }
    }
}

/// One bucket descriptor from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketDesc {
    /// Offset of the bucket's slot table.
    pub hpos: u64,
    /// Number of slots in the table (twice the records in the bucket).
    pub hslots: u32,
}

impl BucketDesc {
    /// Offset one past the last slot of this bucket.
    #[must_use]
    pub fn end(&self, width: SlotWidth) -> u64 {
        self.hpos + (u64::from(self.hslots) << width.shift())
    }
}

/// Writes descriptor `desc` into the 16-byte header entry `buf`.
pub fn write_bucket(buf: &mut [u8], desc: BucketDesc) {
    BigEndian::write_u64(&mut buf[0..8], desc.hpos);
    BigEndian::write_u32(&mut buf[8..12], desc.hslots);
    BigEndian::write_u32(&mut buf[12..16], 0);
}

/// Reads bucket `index` from a header of at least [`HEADER_BYTES`] bytes.
#[must_use]
pub fn read_bucket(header: &[u8], index: usize) -> BucketDesc {
    let p = &header[index * BUCKET_DESC_BYTES..][..BUCKET_DESC_BYTES];
    BucketDesc {
        hpos: BigEndian::read_u64(&p[0..8]),
        hslots: BigEndian::read_u32(&p[8..12]),
    }
}

/// One decoded slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Full 32-bit hash of the key.
    pub hash: u32,
    /// Key length; only stored in wide slots.
    pub klen: Option<u32>,
    /// Offset of the record; 0 for an empty slot.
    pub dpos: u64,
}

impl Slot {
    /// Returns `true` if the slot is unused.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dpos == 0
    }
}

/// Reads the slot at absolute offset `pos` of `data`.
pub fn read_slot(data: &[u8], pos: u64, width: SlotWidth) -> Result<Slot> {
    let p = usize::try_from(pos)
        .ok()
        .and_then(|start| data.get(start..start.checked_add(width.bytes() as usize)?))
        .ok_or_else(|| Error::format(pos, "slot lies outside the file"))?;
    Ok(match width {
        SlotWidth::Narrow => Slot {
            hash: BigEndian::read_u32(&p[0..4]),
            klen: None,
            dpos: u64::from(BigEndian::read_u32(&p[4..8])),
        },
        SlotWidth::Wide => Slot {
            hash: BigEndian::read_u32(&p[0..4]),
            klen: Some(BigEndian::read_u32(&p[4..8])),
            dpos: BigEndian::read_u64(&p[8..16]),
        },
    })
}

/// Writes `slot` into `buf`, which must be exactly one slot wide.
///
/// In narrow form `dpos` must fit in 32 bits and `klen` is not stored.
pub fn write_slot(buf: &mut [u8], width: SlotWidth, slot: Slot) {
    BigEndian::write_u32(&mut buf[0..4], slot.hash);
    match width {
        SlotWidth::Narrow => BigEndian::write_u32(&mut buf[4..8], slot.dpos as u32),
        SlotWidth::Wide => {
            BigEndian::write_u32(&mut buf[4..8], slot.klen.unwrap_or(0));
            BigEndian::write_u64(&mut buf[8..16], slot.dpos);
        }
    }
}

/// Returns `true` if the slot stored in `buf` is unused.
#[inline]
#[must_use]
pub fn slot_is_empty(buf: &[u8], width: SlotWidth) -> bool {
    match width {
        SlotWidth::Narrow => buf[4..8] == [0u8; 4],
        SlotWidth::Wide => buf[8..16] == [0u8; 8],
    }
}

/// Parsed and validated header of a committed database.
#[derive(Debug, Clone)]
pub struct Header {
    buckets: Vec<BucketDesc>,
    width: SlotWidth,
    records: u64,
}

impl Header {
    /// Parses the header of the mapped file `data` and checks it against the
    /// file length.
    ///
    /// # Validation
    ///
    /// - The file must hold at least the 4096-byte header.
    /// - The record region must start at or after the header.
    /// - Slot tables must be contiguous, in bucket order, and end exactly at
    ///   the end of the file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let file_len = data.len() as u64;
        if data.len() < HEADER_BYTES {
            return Err(Error::format(
                0,
                format!("file of {} bytes is too small for the header", file_len),
            ));
        }

        let width = SlotWidth::detect(file_len, data);
        let buckets: Vec<BucketDesc> = (0..BUCKETS).map(|i| read_bucket(data, i)).collect();

        let data_end = buckets[0].hpos;
        if data_end < HEADER_BYTES as u64 || data_end > file_len {
            return Err(Error::format(
                0,
                format!("record region end {} outside [{}, {}]", data_end, HEADER_BYTES, file_len),
            ));
        }

        let mut expected = data_end;
        let mut total_slots: u64 = 0;
        for (i, b) in buckets.iter().enumerate() {
            let desc_offset = (i * BUCKET_DESC_BYTES) as u64;
            if b.hpos != expected {
                return Err(Error::format(
                    desc_offset,
                    format!("bucket {} table at {} but expected {}", i, b.hpos, expected),
                ));
            }
            expected = b
                .hpos
                .checked_add(u64::from(b.hslots) << width.shift())
                .filter(|end| *end <= file_len)
                .ok_or_else(|| {
                    Error::format(
                        desc_offset,
                        format!("bucket {} table of {} slots exceeds file size {}", i, b.hslots, file_len),
                    )
                })?;
            total_slots += u64::from(b.hslots);
        }

        if expected != file_len {
            return Err(Error::format(
                expected,
                format!("slot tables end at {} but file is {} bytes", expected, file_len),
            ));
        }

        Ok(Self {
            buckets,
            width,
            records: total_slots / 2,
        })
    }

    /// Descriptor of bucket `index`.
    #[inline]
    #[must_use]
    pub fn bucket(&self, index: usize) -> BucketDesc {
        self.buckets[index]
    }

    /// Slot width used by the file.
    #[inline]
    #[must_use]
    pub fn width(&self) -> SlotWidth {
        self.width
    }

    /// Number of records, derived from the slot counts.
    #[inline]
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Offset one past the record region (start of the first slot table).
    #[inline]
    #[must_use]
    pub fn data_end(&self) -> u64 {
        self.buckets[0].hpos
    }
}
