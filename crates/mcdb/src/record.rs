//! Record codec.
//!
//! ```text
//! [klen: u32 BE][dlen: u32 BE][key bytes][value bytes]
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Size of the length prefix of every record.
pub const RECORD_HEADER_BYTES: u64 = 8;

/// Builds the 8-byte length prefix for a record.
#[must_use]
pub fn encode_header(klen: u32, dlen: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_u32(&mut buf[0..4], klen);
    BigEndian::write_u32(&mut buf[4..8], dlen);
    buf
}

/// Total encoded size of a record.
#[inline]
#[must_use]
pub fn encoded_len(klen: usize, dlen: usize) -> u64 {
    RECORD_HEADER_BYTES + klen as u64 + dlen as u64
}

/// A record decoded in place; both slices borrow the mapped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    /// Offset of the record's length prefix.
    pub offset: u64,
    /// Key bytes.
    pub key: &'a [u8],
    /// Value bytes.
    pub value: &'a [u8],
}

impl RecordRef<'_> {
    /// Offset of the value bytes.
    #[must_use]
    pub fn value_offset(&self) -> u64 {
        self.offset + RECORD_HEADER_BYTES + self.key.len() as u64
    }

    /// Offset of the next record.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.value_offset() + self.value.len() as u64
    }
}

/// Reads the `(klen, dlen)` prefix at `offset`, which must end before `end`.
pub fn decode_header(data: &[u8], offset: u64, end: u64) -> Result<(u32, u32)> {
    let p = slice(data, offset, RECORD_HEADER_BYTES, end)
        .ok_or_else(|| Error::format(offset, "record header runs past the record region"))?;
    Ok((BigEndian::read_u32(&p[0..4]), BigEndian::read_u32(&p[4..8])))
}

/// Decodes the record at `offset`. Every byte of it must lie before `end`.
pub fn decode(data: &[u8], offset: u64, end: u64) -> Result<RecordRef<'_>> {
    let (klen, dlen) = decode_header(data, offset, end)?;
    let key_offset = offset + RECORD_HEADER_BYTES;
    let key = slice(data, key_offset, u64::from(klen), end).ok_or_else(|| {
        Error::format(offset, format!("key of {} bytes is truncated", klen))
    })?;
    let value = slice(data, key_offset + u64::from(klen), u64::from(dlen), end).ok_or_else(|| {
        Error::format(offset, format!("value of {} bytes is truncated", dlen))
    })?;
    Ok(RecordRef { offset, key, value })
}

/// Bounds-checked `data[offset..offset + len]`, also requiring it to end at or before `end`.
fn slice(data: &[u8], offset: u64, len: u64, end: u64) -> Option<&[u8]> {
    let stop = offset.checked_add(len)?;
    if stop > end {
        return None;
    }
    data.get(usize::try_from(offset).ok()?..usize::try_from(stop).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut buf = encode_header(key.len() as u32, value.len() as u32).to_vec();
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
        buf
    }

    #[test]
    fn header_is_big_endian() {
        assert_eq!(encode_header(1, 0x0102_0304), [0, 0, 0, 1, 1, 2, 3, 4]);
    }

    #[test]
    fn decode_at_offset() {
        let mut data = vec![0xaa; 5];
        data.extend(encode(b"key", b"value"));
        let end = data.len() as u64;
        let rec = decode(&data, 5, end).unwrap();
        assert_eq!(rec.key, b"key");
        assert_eq!(rec.value, b"value");
        assert_eq!(rec.value_offset(), 5 + 8 + 3);
        assert_eq!(rec.next_offset(), end);
    }

    #[test]
    fn empty_key_and_value() {
        let data = encode(b"", b"");
        let rec = decode(&data, 0, data.len() as u64).unwrap();
        assert!(rec.key.is_empty());
        assert!(rec.value.is_empty());
        assert_eq!(encoded_len(0, 0), 8);
    }

    #[test]
    fn truncated_value_is_format_error() {
        let data = encode(b"k", b"long value");
        let err = decode(&data, 0, data.len() as u64 - 1).unwrap_err();
        assert!(matches!(err, Error::Format { offset: 0, .. }));
    }

    #[test]
    fn header_past_end_is_format_error() {
        let data = encode(b"k", b"v");
        assert!(decode_header(&data, 4, data.len() as u64).is_err());
    }

    #[test]
    fn huge_lengths_do_not_overflow() {
        let mut data = encode_header(u32::MAX, u32::MAX).to_vec();
        data.extend_from_slice(b"xy");
        assert!(decode(&data, 0, data.len() as u64).is_err());
    }
}
