mod cursor_tests;
mod format_tests;

use crate::{Builder, Reader};
use std::path::Path;

/// The four-record database used throughout: "c" occurs twice.
pub(crate) const SAMPLE: [(&[u8], &[u8]); 4] = [(b"a", b"b"), (b"c", b"d"), (b"c", b"dd"), (b"e", b"f")];

/// Builds a database at `path` from `records`, in order, without fsync.
pub(crate) fn build(path: &Path, records: &[(&[u8], &[u8])]) -> crate::Result<()> {
    let mut b = Builder::open(path, Some(0o644))?;
    for (k, v) in records {
        b.add(k, v)?;
    }
    b.finish(false)
}

pub(crate) fn build_sample(path: &Path) -> crate::Result<Reader> {
    build(path, &SAMPLE)?;
    Reader::open(path)
}
