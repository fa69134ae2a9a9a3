use super::build;
use crate::format::*;
use crate::Reader;
use anyhow::Result;
use tempfile::tempdir;

fn be32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(b[at..at + 4].try_into().unwrap())
}

fn be64(b: &[u8], at: usize) -> u64 {
    u64::from_be_bytes(b[at..at + 8].try_into().unwrap())
}

#[test]
fn single_record_image_is_bit_exact() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("a.mcdb");
    build(&path, &[(b"a", b"b")])?;
    let bytes = std::fs::read(&path)?;

    assert_eq!(bytes.len(), 4128);

    // Record at 4096, then 0xff padding to 4112.
    assert_eq!(&bytes[4096..4106], &[0, 0, 0, 1, 0, 0, 0, 1, b'a', b'b']);
    assert_eq!(&bytes[4106..4112], &[0xff; 6]);

    // "a" hashes to 177604: bucket 196, start slot 693 % 2 = 1.
    for i in 0..BUCKETS {
        let d = &bytes[i * 16..i * 16 + 16];
        let (hpos, hslots) = (be64(d, 0), be32(d, 8));
        assert_eq!(be32(d, 12), 0, "reserved word of bucket {}", i);
        match i {
            0..=196 => assert_eq!(hpos, 4112, "bucket {}", i),
            _ => assert_eq!(hpos, 4128, "bucket {}", i),
        }
        assert_eq!(hslots, if i == 196 { 2 } else { 0 }, "bucket {}", i);
    }
    assert_eq!(&bytes[4112..4120], &[0u8; 8]);
    assert_eq!(be32(&bytes, 4120), 177_604);
    assert_eq!(be32(&bytes, 4124), 4096);
    Ok(())
}

#[test]
fn empty_database_is_header_only() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.mcdb");
    build(&path, &[])?;
    let bytes = std::fs::read(&path)?;

    assert_eq!(bytes.len(), HEADER_BYTES);
    for i in 0..BUCKETS {
        assert_eq!(be64(&bytes, i * 16), HEADER_BYTES as u64);
        assert_eq!(be32(&bytes, i * 16 + 8), 0);
    }
    Ok(())
}

#[test]
fn record_count_comes_from_slot_totals() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("db.mcdb");
    build(&path, &super::SAMPLE)?;
    let bytes = std::fs::read(&path)?;

    let header = Header::parse(&bytes)?;
    assert_eq!(header.records(), 4);
    assert_eq!(header.width(), SlotWidth::Narrow);
    assert_eq!(header.data_end() % PAD_ALIGN, 0);
    assert_eq!(Reader::open(&path)?.len()?, 4);
    Ok(())
}

#[test]
fn width_selection() {
    assert_eq!(SlotWidth::for_data_end(4096), SlotWidth::Narrow);
    assert_eq!(SlotWidth::for_data_end(u64::from(u32::MAX) - 1), SlotWidth::Narrow);
    assert_eq!(SlotWidth::for_data_end(u64::from(u32::MAX)), SlotWidth::Wide);
    assert_eq!(SlotWidth::Narrow.bytes(), 8);
    assert_eq!(SlotWidth::Wide.bytes(), 16);

    let mut header = vec![0u8; HEADER_BYTES];
    assert_eq!(SlotWidth::detect(1 << 33, &header), SlotWidth::Narrow);
    write_bucket(&mut header[..16], BucketDesc { hpos: 1 << 32, hslots: 0 });
    assert_eq!(SlotWidth::detect(1 << 33, &header), SlotWidth::Wide);
    // Small files are always narrow.
    assert_eq!(SlotWidth::detect(8192, &header), SlotWidth::Narrow);
}

#[test]
fn wide_slot_layout() -> Result<()> {
    let slot = Slot {
        hash: 0xdead_beef,
        klen: Some(7),
        dpos: 0x1_0000_0010,
    };
    let mut buf = [0u8; 16];
    assert!(slot_is_empty(&buf, SlotWidth::Wide));
    write_slot(&mut buf, SlotWidth::Wide, slot);
    assert!(!slot_is_empty(&buf, SlotWidth::Wide));
    assert_eq!(be32(&buf, 0), 0xdead_beef);
    assert_eq!(be32(&buf, 4), 7);
    assert_eq!(be64(&buf, 8), 0x1_0000_0010);
    assert_eq!(read_slot(&buf, 0, SlotWidth::Wide)?, slot);
    Ok(())
}

#[test]
fn narrow_slot_layout() -> Result<()> {
    let mut buf = [0u8; 8];
    write_slot(
        &mut buf,
        SlotWidth::Narrow,
        Slot { hash: 5381, klen: Some(3), dpos: 4096 },
    );
    assert_eq!(buf, [0, 0, 0x15, 0x05, 0, 0, 0x10, 0]);
    let back = read_slot(&buf, 0, SlotWidth::Narrow)?;
    assert_eq!(back, Slot { hash: 5381, klen: None, dpos: 4096 });
    assert!(read_slot(&buf, 1, SlotWidth::Narrow).is_err());
    Ok(())
}

#[test]
fn probe_geometry() {
    assert_eq!(bucket_of(178_056_679), 231);
    assert_eq!(start_slot(178_056_679, 10), 695_533 % 10);
    assert_eq!(padding_for(4096), 0);
    assert_eq!(padding_for(4106), 6);
    assert_eq!(padding_for(4111), 1);
}

#[test]
fn gap_between_tables_is_rejected() {
    let mut image = vec![0u8; HEADER_BYTES + 16];
    for i in 0..BUCKETS {
        write_bucket(
            &mut image[i * 16..i * 16 + 16],
            BucketDesc { hpos: HEADER_BYTES as u64, hslots: 0 },
        );
    }
    // Tables end at 4096 but the file is 16 bytes longer.
    assert!(Header::parse(&image).is_err());
    image.truncate(HEADER_BYTES);
    assert!(Header::parse(&image).is_ok());
}
