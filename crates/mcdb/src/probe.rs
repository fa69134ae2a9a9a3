//! Linear-probe walk over one bucket's slot table.
//!
//! A [`Probe`] remembers where it stopped, so successive calls to
//! [`Probe::next`] return the occurrences of a key one by one, in the order
//! they were added. Both `lookup_nth` and the reader's `find_key`/`find_next`
//! cursor are built on it.

use hash::djb_hash;

use crate::error::Result;
use crate::format::{bucket_of, read_slot, start_slot, Header};
use crate::record::{self, RECORD_HEADER_BYTES};

/// One matching record found by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hit {
    /// Offset of the record's length prefix.
    pub record_pos: u64,
    /// Offset of the key bytes.
    pub key_pos: u64,
    pub klen: u32,
    /// Offset of the value bytes.
    pub value_pos: u64,
    pub dlen: u32,
    /// Slots inspected to reach this hit, counting the hit itself.
    pub probes: u32,
}

impl Hit {
    /// Value bytes of the hit. `data` must be the image the probe ran over.
    pub fn value<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.value_pos as usize;
        &data[start..start + self.dlen as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Probe {
    khash: u32,
    hpos: u64,
    hslots: u32,
    /// Next slot index to inspect.
    slot: u32,
    /// Slots inspected so far; equals `hslots` once exhausted.
    probed: u32,
}

impl Probe {
    /// Positions a probe on the start slot of `key`'s bucket.
    /// Returns `None` when the bucket is empty.
    pub fn start(header: &Header, key: &[u8]) -> Option<Self> {
        let khash = djb_hash(key);
        let bucket = header.bucket(bucket_of(khash));
        if bucket.hslots == 0 {
            return None;
        }
        Some(Self {
            khash,
            hpos: bucket.hpos,
            hslots: bucket.hslots,
            slot: start_slot(khash, bucket.hslots),
            probed: 0,
        })
    }

    /// Advances to the next record whose key equals `key`.
    ///
    /// Candidates are filtered by full hash, then (wide slots only) by key
    /// length, and finally confirmed by comparing the key bytes.
    pub fn next(&mut self, data: &[u8], header: &Header, key: &[u8]) -> Result<Option<Hit>> {
        let width = header.width();
        let data_end = header.data_end();
        while self.probed < self.hslots {
            let pos = self.hpos + (u64::from(self.slot) << width.shift());
            let slot = read_slot(data, pos, width)?;
            self.slot += 1;
            if self.slot == self.hslots {
                self.slot = 0;
            }
            if slot.is_empty() {
                break;
            }
            self.probed += 1;

            if slot.hash != self.khash {
                continue;
            }
            if let Some(klen) = slot.klen {
                if klen as usize != key.len() {
                    continue;
                }
            }
            let (klen, dlen) = record::decode_header(data, slot.dpos, data_end)?;
            if klen as usize != key.len() {
                continue;
            }
            let rec = record::decode(data, slot.dpos, data_end)?;
            if rec.key != key {
                continue;
            }
            let key_pos = slot.dpos + RECORD_HEADER_BYTES;
            return Ok(Some(Hit {
                record_pos: slot.dpos,
                key_pos,
                klen,
                value_pos: key_pos + u64::from(klen),
                dlen,
                probes: self.probed,
            }));
        }
        self.probed = self.hslots;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{write_bucket, write_slot, BucketDesc, Slot, SlotWidth, HEADER_BYTES};
    use crate::record::encode_header;

    /// Builds a tiny narrow image by hand: the given records, all placed in
    /// their bucket at consecutive slots from the start slot.
    fn image(records: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_BYTES];
        let mut offsets = Vec::new();
        for (k, v) in records {
            offsets.push(data.len() as u64);
            data.extend_from_slice(&encode_header(k.len() as u32, v.len() as u32));
            data.extend_from_slice(k);
            data.extend_from_slice(v);
        }
        while data.len() % 16 != 0 {
            data.push(0xff);
        }
        let width = SlotWidth::Narrow;
        let mut pos = data.len() as u64;
        let mut tables = Vec::new();
        for b in 0..256usize {
            let members: Vec<usize> = (0..records.len())
                .filter(|&i| bucket_of(djb_hash(records[i].0)) == b)
                .collect();
            let hslots = members.len() as u32 * 2;
            write_bucket(
                &mut data[b * 16..b * 16 + 16],
                BucketDesc { hpos: pos, hslots },
            );
            let mut table = vec![0u8; hslots as usize * 8];
            for &i in &members {
                let h = djb_hash(records[i].0);
                let mut u = start_slot(h, hslots);
                while table[u as usize * 8 + 4..u as usize * 8 + 8] != [0u8; 4] {
                    u = (u + 1) % hslots;
                }
                write_slot(
                    &mut table[u as usize * 8..u as usize * 8 + 8],
                    width,
                    Slot { hash: h, klen: None, dpos: offsets[i] },
                );
            }
            pos += table.len() as u64;
            tables.extend(table);
        }
        data.extend(tables);
        data
    }

    #[test]
    fn walks_duplicates_in_insertion_order() {
        let data = image(&[(b"k", b"1"), (b"x", b"-"), (b"k", b"2"), (b"k", b"3")]);
        let header = Header::parse(&data).unwrap();
        let mut probe = Probe::start(&header, b"k").unwrap();
        let mut seen = Vec::new();
        while let Some(hit) = probe.next(&data, &header, b"k").unwrap() {
            seen.push(hit.value(&data).to_vec());
        }
        assert_eq!(seen, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
        assert_eq!(probe.probed, probe.hslots);
        assert_eq!(probe.next(&data, &header, b"k").unwrap(), None);
    }

    #[test]
    fn empty_bucket_has_no_probe() {
        let data = image(&[(b"a", b"b")]);
        let header = Header::parse(&data).unwrap();
        // "c" hashes to bucket 198, which is empty here.
        assert!(Probe::start(&header, b"c").is_none());
    }

    #[test]
    fn first_hit_counts_one_probe() {
        let data = image(&[(b"hello", b"world")]);
        let header = Header::parse(&data).unwrap();
        let hit = Probe::start(&header, b"hello")
            .unwrap()
            .next(&data, &header, b"hello")
            .unwrap()
            .unwrap();
        assert_eq!(hit.probes, 1);
        assert_eq!(hit.record_pos, HEADER_BYTES as u64);
        assert_eq!(hit.klen, 5);
    }

    #[test]
    fn same_bucket_different_key_is_skipped() {
        // Find a second key in the bucket of "k0".
        let base = b"k0".to_vec();
        let bucket = bucket_of(djb_hash(&base));
        let other = (1..10_000u32)
            .map(|i| format!("k{}", i).into_bytes())
            .find(|k| bucket_of(djb_hash(k)) == bucket)
            .unwrap();
        let data = image(&[(&base, b"v0"), (&other, b"v1")]);
        let header = Header::parse(&data).unwrap();
        let mut probe = Probe::start(&header, &other).unwrap();
        let hit = probe.next(&data, &header, &other).unwrap().unwrap();
        assert_eq!(hit.value(&data), b"v1");
        assert_eq!(probe.next(&data, &header, &other).unwrap(), None);
    }
}
