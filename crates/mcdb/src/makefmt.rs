//! cdbmake text interchange format.
//!
//! ```text
//! +klen,dlen:key->value\n      one line per record, lengths in decimal
//! \n                           a blank line ends the input
//! ```
//!
//! Keys and values are raw bytes and may themselves contain newlines or
//! `->`; the lengths say where they end.

use std::io::{self, BufRead, Read, Write};

use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::reader::Reader;

/// Parses cdbmake text from `input` and adds every record to `builder`, in
/// order. Returns the number of records added.
///
/// Input ends at the terminating blank line. Reaching end of input cleanly
/// between two records is accepted as well.
///
/// # Errors
///
/// [`Error::Format`] with the byte offset of the problem if the text is
/// malformed; I/O errors from `input`; any error from [`Builder::add`].
pub fn load<R: BufRead>(input: R, builder: &mut Builder) -> Result<u64> {
    let mut p = Parser { input, offset: 0 };
    let mut key = Vec::new();
    let mut value = Vec::new();
    let mut records = 0u64;

    loop {
        match p.byte()? {
            None | Some(b'\n') => break,
            Some(b'+') => {}
            Some(b) => return Err(p.error(format!("expected '+' or blank line, got {:#04x}", b))),
        }
        let klen = p.decimal(b',')?;
        let dlen = p.decimal(b':')?;
        p.bytes(klen, &mut key)?;
        p.expect(b'-')?;
        p.expect(b'>')?;
        p.bytes(dlen, &mut value)?;
        p.expect(b'\n')?;

        builder.add(&key, &value)?;
        records += 1;
    }

    tracing::debug!(records, bytes = p.offset, "cdbmake input loaded");
    Ok(records)
}

/// Writes every record of `reader` to `out` in cdbmake format, in build
/// order, followed by the terminating blank line. Returns the number of
/// records written.
pub fn dump<W: Write>(reader: &Reader, mut out: W) -> Result<u64> {
    let mut records = 0u64;
    for rec in reader.iter()? {
        let (k, v) = rec?;
        write!(out, "+{},{}:", k.len(), v.len())?;
        out.write_all(k)?;
        out.write_all(b"->")?;
        out.write_all(v)?;
        out.write_all(b"\n")?;
        records += 1;
    }
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(records)
}

struct Parser<R> {
    input: R,
    offset: u64,
}

impl<R: BufRead> Parser<R> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::format(self.offset, reason)
    }

    fn byte(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.input.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(b[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn expect(&mut self, want: u8) -> Result<()> {
        match self.byte()? {
            Some(b) if b == want => Ok(()),
            Some(b) => Err(self.error(format!("expected {:?}, got {:#04x}", want as char, b))),
            None => Err(self.error(format!("unexpected end of input, expected {:?}", want as char))),
        }
    }

    /// Reads a decimal length terminated by `term`.
    fn decimal(&mut self, term: u8) -> Result<u32> {
        let mut n: u32 = 0;
        let mut digits = 0;
        loop {
            match self.byte()? {
                Some(b) if b.is_ascii_digit() => {
                    n = n
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(u32::from(b - b'0')))
                        .ok_or_else(|| self.error("length does not fit in 32 bits"))?;
                    digits += 1;
                }
                Some(b) if b == term && digits > 0 => return Ok(n),
                Some(b) => {
                    return Err(self.error(format!(
                        "expected digit or {:?}, got {:#04x}",
                        term as char, b
                    )))
                }
                None => return Err(self.error("unexpected end of input in length")),
            }
        }
    }

    /// Reads exactly `len` bytes into `buf`, replacing its contents.
    fn bytes(&mut self, len: u32, buf: &mut Vec<u8>) -> Result<()> {
        buf.clear();
        let got = (&mut self.input).take(u64::from(len)).read_to_end(buf)?;
        self.offset += got as u64;
        if got as u64 != u64::from(len) {
            return Err(self.error(format!("unexpected end of input: wanted {} bytes, got {}", len, got)));
        }
        Ok(())
    }
}
