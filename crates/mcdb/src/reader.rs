use config::Advice;
use memmap2::{Mmap, MmapOptions};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format::{Header, HEADER_BYTES};
use crate::iter::{Iter, Occurrences};
use crate::probe::Probe;

/// Number of probe-distance buckets reported by [`Stats`]: `d0..d9` and `>9`.
pub const STAT_DISTANCES: usize = 11;

/// A committed file mapped into memory, plus what is needed to notice that
/// it was replaced on disk.
struct Mapped {
    map: Mmap,
    header: Header,
    mtime: Option<SystemTime>,
    len: u64,
}

impl Mapped {
    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::file(path, e))?;
        let meta = file.metadata().map_err(|e| Error::file(path, e))?;
        let len = meta.len();
        if len < HEADER_BYTES as u64 {
            return Err(Error::format(
                0,
                format!("{}: file of {} bytes is too small for the header", path.display(), len),
            ));
        }

        // SAFETY: committed databases are never written in place; they are
        // only replaced by rename, which leaves this mapping intact.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::file(path, e))?;
        let header = Header::parse(&map)?;

        debug!(path = %path.display(), bytes = len, records = header.records(), width = ?header.width(), "database mapped");
        Ok(Self {
            map,
            header,
            mtime: meta.modified().ok(),
            len,
        })
    }

    fn data(&self) -> &[u8] {
        &self.map
    }
}

/// Sequential retrieval state for `find_key` / `find_next`.
///
/// The key is remembered by its location in the mapping, so following the
/// occurrences of a key allocates nothing.
#[derive(Debug, Default)]
struct Cursor {
    probe: Option<Probe>,
    key_pos: u64,
    klen: u32,
}

/// Read-only view of a committed database.
///
/// All lookups borrow from the memory mapping: returned keys and values are
/// `&[u8]` slices into the file, valid for as long as the borrow of the
/// reader. Absence of a key is `Ok(None)`, never an error.
///
/// A `Reader` is `Send` but its `find_key`/`find_next` cursor needs
/// `&mut self`; open one reader per thread for concurrent sequential
/// retrieval. Plain lookups only need `&self`.
///
/// # Example
///
/// ```rust,no_run
/// use mcdb::Reader;
///
/// let r = Reader::open("data.mcdb").unwrap();
/// if let Some(v) = r.get(b"c").unwrap() {
///     println!("{}", String::from_utf8_lossy(v));
/// }
/// for rec in r.iter().unwrap() {
///     let (k, v) = rec.unwrap();
///     println!("{:?} => {:?}", k, v);
/// }
/// ```
pub struct Reader {
    path: PathBuf,
    inner: Option<Mapped>,
    cursor: Cursor,
}

impl Reader {
    /// Maps the database at `path` and validates its header.
    ///
    /// # Errors
    ///
    /// An I/O error (check [`Error::is_not_found`]) if the file cannot be
    /// opened or mapped; [`Error::Format`] if it is too short or the bucket
    /// tables do not fit the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = Mapped::load(&path)?;
        Ok(Self {
            path,
            inner: Some(inner),
            cursor: Cursor::default(),
        })
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` once [`close`](Reader::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases the mapping. Every later call fails with [`Error::State`].
    pub fn close(&mut self) -> Result<()> {
        self.mapped()?;
        self.inner = None;
        self.cursor = Cursor::default();
        debug!(path = %self.path.display(), "reader closed");
        Ok(())
    }

    /// Remaps the file if the path now refers to a different file
    /// (modification time or length changed). Resets the cursor on remap.
    ///
    /// Returns `true` if the mapping was replaced.
    pub fn refresh(&mut self) -> Result<bool> {
        let current = self.mapped()?;
        let meta = std::fs::metadata(&self.path).map_err(|e| Error::file(&self.path, e))?;
        if meta.len() == current.len && meta.modified().ok() == current.mtime {
            return Ok(false);
        }
        let fresh = Mapped::load(&self.path)?;
        self.inner = Some(fresh);
        self.cursor = Cursor::default();
        debug!(path = %self.path.display(), "reader remapped");
        Ok(true)
    }

    /// Number of records in the database (duplicates included).
    pub fn len(&self) -> Result<u64> {
        Ok(self.mapped()?.header.records())
    }

    /// Returns `true` if the database holds no record.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Value of the first occurrence of `key`, in build order.
    pub fn lookup_first(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        self.lookup_nth(key, 0)
    }

    /// Alias for [`lookup_first`](Reader::lookup_first).
    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        self.lookup_nth(key, 0)
    }

    /// Value of occurrence `n` (0-based, build order) of `key`.
    ///
    /// `n` past the last occurrence is `Ok(None)`.
    pub fn lookup_nth(&self, key: &[u8], n: usize) -> Result<Option<&[u8]>> {
        let m = self.mapped()?;
        for (i, v) in occurrences(m, key).enumerate() {
            let v = v?;
            if i == n {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    /// Number of occurrences of `key`.
    pub fn count(&self, key: &[u8]) -> Result<usize> {
        let m = self.mapped()?;
        let mut n = 0;
        for v in occurrences(m, key) {
            v?;
            n += 1;
        }
        Ok(n)
    }

    /// Returns `true` if `key` occurs at least once.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.lookup_first(key)?.is_some())
    }

    /// Returns `true` if some record has value `value`. Scans every record.
    pub fn contains_value(&self, value: &[u8]) -> Result<bool> {
        Ok(self.key_of(value)?.is_some())
    }

    /// Key of the first record (build order) whose value is `value`.
    /// Scans every record.
    pub fn key_of(&self, value: &[u8]) -> Result<Option<&[u8]>> {
        for rec in self.iter()? {
            let (k, v) = rec?;
            if v == value {
                return Ok(Some(k));
            }
        }
        Ok(None)
    }

    /// Every value of `key`, in build order.
    pub fn find_all(&self, key: &[u8]) -> Result<Vec<&[u8]>> {
        self.iter_key(key)?.collect()
    }

    /// Concatenation of [`find_all`](Reader::find_all) for each key, in order.
    pub fn values_at<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<&[u8]>> {
        let m = self.mapped()?;
        let mut out = Vec::new();
        for key in keys {
            for v in occurrences(m, key.as_ref()) {
                out.push(v?);
            }
        }
        Ok(out)
    }

    /// Positions the cursor on `key` and returns its first value.
    pub fn find_key(&mut self, key: &[u8]) -> Result<Option<&[u8]>> {
        let Self { inner, cursor, .. } = self;
        let m = inner.as_ref().ok_or(Error::State(CLOSED))?;
        *cursor = Cursor::default();

        let Some(mut probe) = Probe::start(&m.header, key) else {
            return Ok(None);
        };
        let hit = probe.next(m.data(), &m.header, key)?;
        if let Some(hit) = hit {
            *cursor = Cursor {
                probe: Some(probe),
                key_pos: hit.key_pos,
                klen: hit.klen,
            };
            return Ok(Some(hit.value(m.data())));
        }
        Ok(None)
    }

    /// Next value of the key the cursor is positioned on.
    ///
    /// `Ok(None)` once the occurrences are exhausted, or if `find_key` was
    /// never called (or found nothing).
    pub fn find_next(&mut self) -> Result<Option<&[u8]>> {
        let Self { inner, cursor, .. } = self;
        let m = inner.as_ref().ok_or(Error::State(CLOSED))?;
        let Some(probe) = cursor.probe.as_mut() else {
            return Ok(None);
        };
        let data = m.data();
        let start = cursor.key_pos as usize;
        let key = &data[start..start + cursor.klen as usize];
        match probe.next(data, &m.header, key) {
            Ok(Some(hit)) => Ok(Some(hit.value(data))),
            Ok(None) => {
                cursor.probe = None;
                Ok(None)
            }
            Err(e) => {
                cursor.probe = None;
                Err(e)
            }
        }
    }

    /// Lazy scan over all `(key, value)` pairs in build order.
    pub fn iter(&self) -> Result<Iter<'_>> {
        let m = self.mapped()?;
        Ok(Iter::new(m.data(), &m.header))
    }

    /// Lazy sequence of the values of `key`, in build order.
    pub fn iter_key<'k>(&self, key: &'k [u8]) -> Result<Occurrences<'_, 'k>> {
        let m = self.mapped()?;
        Ok(occurrences(m, key))
    }

    /// All keys in build order, duplicates retained.
    pub fn keys(&self) -> Result<Vec<&[u8]>> {
        self.iter()?.map(|r| r.map(|(k, _)| k)).collect()
    }

    /// All values in build order.
    pub fn values(&self) -> Result<Vec<&[u8]>> {
        self.iter()?.map(|r| r.map(|(_, v)| v)).collect()
    }

    /// All `(key, value)` pairs in build order.
    pub fn pairs(&self) -> Result<Vec<(&[u8], &[u8])>> {
        self.iter()?.collect()
    }

    /// Key to value map. A key added several times maps to its **last** value.
    pub fn to_map(&self) -> Result<HashMap<&[u8], &[u8]>> {
        self.iter()?.collect()
    }

    /// Value to key map. A value shared by several records maps to the
    /// **last** such record's key.
    pub fn invert(&self) -> Result<HashMap<&[u8], &[u8]>> {
        self.iter()?.map(|r| r.map(|(k, v)| (v, k))).collect()
    }

    /// Returns `true` if no key occurs more than once.
    pub fn has_unique_keys(&self) -> Result<bool> {
        let m = self.mapped()?;
        let mut it = Iter::new(m.data(), &m.header);
        while let Some(rec) = it.next_record() {
            let rec = rec?;
            // The first occurrence of a duplicated key is an earlier record.
            let first = first_hit_offset(m, rec.key)?;
            if first != Some(rec.offset) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Re-checks the header and walks every record, confirming the record
    /// count implied by the slot tables.
    pub fn validate(&self) -> Result<()> {
        let m = self.mapped()?;
        Header::parse(m.data())?;
        let mut scanned = 0u64;
        for rec in Iter::new(m.data(), &m.header) {
            rec?;
            scanned += 1;
        }
        if scanned != m.header.records() {
            return Err(Error::format(
                m.header.data_end(),
                format!(
                    "record region holds {} records but slot tables index {}",
                    scanned,
                    m.header.records()
                ),
            ));
        }
        Ok(())
    }

    /// Looks every record up again through the index and reports how far
    /// from its start slot each one was found.
    ///
    /// # Errors
    ///
    /// [`Error::Format`] if a record is not reachable through the index.
    pub fn stats(&self) -> Result<Stats> {
        let m = self.mapped()?;
        let mut stats = Stats::default();
        let mut it = Iter::new(m.data(), &m.header);
        while let Some(rec) = it.next_record() {
            let rec = rec?;
            let probes = probes_to(m, rec.key, rec.offset)?.ok_or_else(|| {
                Error::format(rec.offset, "record is not reachable through the index")
            })?;
            let d = (probes as usize - 1).min(STAT_DISTANCES - 1);
            stats.distances[d] += 1;
            stats.records += 1;
        }
        Ok(stats)
    }

    /// Tells the OS how the mapping is about to be accessed.
    ///
    /// Only a hint: failures are logged and ignored, and the call does
    /// nothing on non-unix platforms. Fails only on a closed reader.
    pub fn advise(&self, advice: Advice) -> Result<()> {
        let m = self.mapped()?;
        if let Err(e) = apply_advice(&m.map, advice) {
            warn!(path = %self.path.display(), advice = %advice, error = %e, "madvise failed");
        }
        Ok(())
    }

    fn mapped(&self) -> Result<&Mapped> {
        self.inner.as_ref().ok_or(Error::State(CLOSED))
    }
}

const CLOSED: &str = "reader is closed";

fn occurrences<'a, 'k>(m: &'a Mapped, key: &'k [u8]) -> Occurrences<'a, 'k> {
    Occurrences::new(m.data(), &m.header, key)
}

fn first_hit_offset(m: &Mapped, key: &[u8]) -> Result<Option<u64>> {
    let Some(mut probe) = Probe::start(&m.header, key) else {
        return Ok(None);
    };
    Ok(probe.next(m.data(), &m.header, key)?.map(|hit| hit.record_pos))
}

/// Slots inspected before the probe for `key` reaches the record at `offset`.
fn probes_to(m: &Mapped, key: &[u8], offset: u64) -> Result<Option<u32>> {
    let Some(mut probe) = Probe::start(&m.header, key) else {
        return Ok(None);
    };
    while let Some(hit) = probe.next(m.data(), &m.header, key)? {
        if hit.record_pos == offset {
            return Ok(Some(hit.probes));
        }
    }
    Ok(None)
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Reader");
        d.field("path", &self.path);
        match &self.inner {
            Some(m) => d
                .field("bytes", &m.len)
                .field("records", &m.header.records()),
            None => d.field("closed", &true),
        };
        d.finish()
    }
}

#[cfg(unix)]
fn apply_advice(map: &Mmap, advice: Advice) -> std::io::Result<()> {
    use memmap2::Advice as Madv;
    match advice {
        Advice::Normal => map.advise(Madv::Normal),
        Advice::Random => map.advise(Madv::Random),
        Advice::Sequential => map.advise(Madv::Sequential),
        Advice::WillNeed => map.advise(Madv::WillNeed),
        // SAFETY: the mapping is private and read-only, so dropped pages are
        // simply re-read from the file on next access.
        #[allow(unsafe_code)]
        Advice::DontNeed => unsafe { map.unchecked_advise(memmap2::UncheckedAdvice::DontNeed) },
    }
}

#[cfg(not(unix))]
fn apply_advice(_map: &Mmap, _advice: Advice) -> std::io::Result<()> {
    Ok(())
}

/// Probe-distance histogram produced by [`Reader::stats`].
///
/// `distances[d]` counts records found `d` slots past their start slot;
/// the last entry collects everything farther than 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Records checked.
    pub records: u64,
    /// Histogram `d0..d9`, then `>9`.
    pub distances: [u64; STAT_DISTANCES],
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records {}", self.records)?;
        for (d, n) in self.distances[..STAT_DISTANCES - 1].iter().enumerate() {
            writeln!(f, "d{:<7}{}", d, n)?;
        }
        writeln!(f, ">9      {}", self.distances[STAT_DISTANCES - 1])
    }
}
