use super::{build, build_sample};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn find_next_walks_occurrences_then_stops() -> Result<()> {
    let dir = tempdir()?;
    let mut r = build_sample(&dir.path().join("db.mcdb"))?;

    assert_eq!(r.find_key(b"c")?, Some(&b"d"[..]));
    assert_eq!(r.find_next()?, Some(&b"dd"[..]));
    assert_eq!(r.find_next()?, None);
    assert_eq!(r.find_next()?, None);
    Ok(())
}

#[test]
fn find_next_without_find_key_is_not_found() -> Result<()> {
    let dir = tempdir()?;
    let mut r = build_sample(&dir.path().join("db.mcdb"))?;
    assert_eq!(r.find_next()?, None);
    Ok(())
}

#[test]
fn find_key_resets_the_cursor() -> Result<()> {
    let dir = tempdir()?;
    let mut r = build_sample(&dir.path().join("db.mcdb"))?;

    assert_eq!(r.find_key(b"c")?, Some(&b"d"[..]));
    assert_eq!(r.find_key(b"a")?, Some(&b"b"[..]));
    assert_eq!(r.find_next()?, None);

    assert_eq!(r.find_key(b"c")?, Some(&b"d"[..]));
    assert_eq!(r.find_key(b"c")?, Some(&b"d"[..]));
    assert_eq!(r.find_next()?, Some(&b"dd"[..]));
    Ok(())
}

#[test]
fn missing_key_clears_the_cursor() -> Result<()> {
    let dir = tempdir()?;
    let mut r = build_sample(&dir.path().join("db.mcdb"))?;

    assert_eq!(r.find_key(b"c")?, Some(&b"d"[..]));
    assert_eq!(r.find_key(b"missing")?, None);
    assert_eq!(r.find_next()?, None);
    Ok(())
}

#[test]
fn cursor_is_independent_of_iteration() -> Result<()> {
    let dir = tempdir()?;
    let mut r = build_sample(&dir.path().join("db.mcdb"))?;

    assert_eq!(r.find_key(b"c")?, Some(&b"d"[..]));
    assert_eq!(r.iter()?.count(), 4);
    assert_eq!(r.lookup_nth(b"c", 1)?, Some(&b"dd"[..]));
    assert_eq!(r.find_next()?, Some(&b"dd"[..]));
    Ok(())
}

#[test]
fn cursor_follows_long_duplicate_chain() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("dups.mcdb");
    let values: Vec<String> = (0..100).map(|i| format!("v{}", i)).collect();
    let mut records: Vec<(&[u8], &[u8])> = Vec::new();
    for (i, v) in values.iter().enumerate() {
        records.push((b"dup", v.as_bytes()));
        if i % 3 == 0 {
            records.push((b"other", b"x"));
        }
    }
    build(&path, &records)?;

    let mut r = Reader::open(&path)?;
    let mut seen = Vec::new();
    let mut next = r.find_key(b"dup")?.map(<[u8]>::to_vec);
    while let Some(v) = next {
        seen.push(String::from_utf8(v)?);
        next = r.find_next()?.map(<[u8]>::to_vec);
    }
    assert_eq!(seen, values);
    Ok(())
}
