use config::{BuildConfig, DEFAULT_MODE};
use hash::djb_hash;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format::{
    self, bucket_of, padding_for, start_slot, BucketDesc, Slot, SlotWidth, BUCKETS,
    BUCKET_DESC_BYTES, HEADER_BYTES, MAX_FIELD_LEN, MAX_RECORDS, PAD_BYTE,
};
use crate::record;

/// Write buffer size for the temporary file.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// Lifecycle of a [`Builder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Accepting records.
    Building,
    /// Committed; the target path holds the new database.
    Finished,
    /// Discarded (explicitly, or after a failed commit).
    Canceled,
}

/// Index entry remembered for every record until commit.
#[derive(Debug, Clone, Copy)]
struct PendingSlot {
    hash: u32,
    klen: u32,
    dpos: u64,
}

/// The temporary file being filled. Dropping it deletes the file.
struct Output {
    file: BufWriter<File>,
    tmp_path: TempPath,
}

/// Builds a database file and atomically installs it at a target path.
///
/// Records are streamed into a uniquely named temporary file next to the
/// target as they are added; only the small per-record index entry
/// (hash, key length, offset) stays in memory. [`finish`](Builder::finish)
/// appends the slot tables, fills in the header, optionally fsyncs, and
/// renames the temporary file over the target.
///
/// # Crash Safety
///
/// Readers of the target never see a partial file: before the rename they see
/// the previous file (or nothing), after it the complete new one. If the
/// process dies mid-build the temporary file is left behind and the target is
/// untouched.
///
/// # Duplicate keys
///
/// Keys are never deduplicated. Each `add` creates a new occurrence, and the
/// occurrences of one key are found by readers in the order they were added.
///
/// # Example
///
/// ```rust,no_run
/// use mcdb::{Builder, Reader};
///
/// let mut b = Builder::open("data.mcdb", None).unwrap();
/// b.add(b"c", b"d").unwrap();
/// b.add(b"c", b"dd").unwrap();
/// b.finish(true).unwrap();
///
/// let r = Reader::open("data.mcdb").unwrap();
/// assert_eq!(r.lookup_nth(b"c", 1).unwrap(), Some(&b"dd"[..]));
/// ```
pub struct Builder {
    path: PathBuf,
    mode: u32,
    state: BuildState,
    out: Option<Output>,
    /// Pending index entries, grouped by bucket, in insertion order.
    buckets: Vec<Vec<PendingSlot>>,
    /// Offset where the next record will be written.
    pos: u64,
    records: u64,
}

impl Builder {
    /// Starts a build session targeting `path`.
    ///
    /// A temporary file is created in the same directory, so the final rename
    /// never crosses filesystems. `mode` sets the permission bits of the
    /// committed file; `None` keeps those of an existing target, or uses
    /// [`DEFAULT_MODE`] (owner read-only) for a new one.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory is not writable, or if `path`
    /// exists but is not a regular file.
    pub fn open<P: AsRef<Path>>(path: P, mode: Option<u32>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mode = resolve_mode(&path, mode)?;
        let dir = parent_dir(&path);

        let prefix = format!(
            ".{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "mcdb".to_string())
        );
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| Error::file(dir, e))?;
        let (file, tmp_path) = tmp.into_parts();
        let mut file = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);

        // Reserve the header; it is filled in by `finish`.
        file.write_all(&[0u8; HEADER_BYTES])
            .map_err(|e| Error::file(&tmp_path, e))?;

        debug!(path = %path.display(), tmp = %tmp_path.display(), mode = %format!("{mode:o}"), "builder opened");

        Ok(Self {
            path,
            mode,
            state: BuildState::Building,
            out: Some(Output { file, tmp_path }),
            buckets: vec![Vec::new(); BUCKETS],
            pos: HEADER_BYTES as u64,
            records: 0,
        })
    }

    /// Builds a database in one call.
    ///
    /// Opens a builder for `path` with `config.mode`, hands it to `fill`, and
    /// commits with `config.sync` if `fill` succeeds. If `fill` fails the
    /// build is canceled, the target is left untouched, and the error is
    /// returned.
    pub fn create<P, F>(path: P, config: BuildConfig, fill: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut Builder) -> Result<()>,
    {
        let mut builder = Builder::open(path, config.mode)?;
        match fill(&mut builder) {
            Ok(()) => builder.finish(config.sync),
            Err(e) => {
                if builder.is_building() {
                    builder.cancel()?;
                }
                Err(e)
            }
        }
    }

    /// Appends a record. Duplicate keys are kept, never overwritten.
    ///
    /// # Errors
    ///
    /// - [`Error::State`] after `finish` or `cancel`.
    /// - [`Error::Limit`] if the key or value is longer than
    ///   [`MAX_FIELD_LEN`] or the database already holds [`MAX_RECORDS`]
    ///   records; the session stays usable.
    /// - An I/O error if the temporary file cannot be written; the session
    ///   is canceled.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_building()?;
        check_len("key length", key.len())?;
        check_len("value length", value.len())?;
        if self.records >= MAX_RECORDS {
            return Err(Error::Limit {
                what: "record count",
                len: self.records + 1,
                limit: MAX_RECORDS,
            });
        }

        let out = self
            .out
            .as_mut()
            .ok_or(Error::State("builder has no output file"))?;
        if let Err(e) = write_record(&mut out.file, key, value) {
            let err = Error::file(&out.tmp_path, e);
            self.abort();
            return Err(err);
        }

        let hash = djb_hash(key);
        self.buckets[bucket_of(hash)].push(PendingSlot {
            hash,
            klen: key.len() as u32,
            dpos: self.pos,
        });
        self.pos += record::encoded_len(key.len(), value.len());
        self.records += 1;
        Ok(())
    }

    /// Assignment-style alias for [`add`](Builder::add).
    ///
    /// Setting a key twice stores two occurrences, exactly like two `add`s.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.add(key, value)
    }

    /// Commits the database to the target path.
    ///
    /// Writes the alignment padding and slot tables, fills in the header,
    /// applies the file mode, fsyncs the data if `sync` is true, and renames
    /// the temporary file over the target. With `sync` the parent directory
    /// is fsynced too, so the rename itself survives a crash.
    ///
    /// # Errors
    ///
    /// [`Error::State`] if the session is already finished or canceled. On an
    /// I/O failure the temporary file is removed, the target is untouched,
    /// and the session becomes [`BuildState::Canceled`].
    pub fn finish(&mut self, sync: bool) -> Result<()> {
        self.ensure_building()?;
        let out = self
            .out
            .take()
            .ok_or(Error::State("builder has no output file"))?;
        let buckets = std::mem::take(&mut self.buckets);

        match self.commit(out, &buckets, sync) {
            Ok(()) => {
                self.state = BuildState::Finished;
                debug!(path = %self.path.display(), records = self.records, bytes = self.pos, "database committed");
                Ok(())
            }
            Err(e) => {
                self.state = BuildState::Canceled;
                warn!(path = %self.path.display(), error = %e, "commit failed; target left untouched");
                Err(e)
            }
        }
    }

    /// Discards the session: the temporary file is deleted and the target
    /// path is not touched.
    ///
    /// # Errors
    ///
    /// [`Error::State`] if the session is already finished or canceled; an
    /// I/O error if the temporary file cannot be removed.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_building()?;
        self.state = BuildState::Canceled;
        self.buckets = Vec::new();
        if let Some(Output { file, tmp_path }) = self.out.take() {
            drop(file);
            let shown = tmp_path.to_path_buf();
            tmp_path.close().map_err(|e| Error::file(shown, e))?;
        }
        debug!(path = %self.path.display(), "build canceled");
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Returns `true` while records may still be added.
    #[must_use]
    pub fn is_building(&self) -> bool {
        self.state == BuildState::Building
    }

    /// Number of records added so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.records
    }

    /// Returns `true` if no record has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Target path of the session.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_building(&self) -> Result<()> {
        match self.state {
            BuildState::Building => Ok(()),
            BuildState::Finished => Err(Error::State("builder is already finished")),
            BuildState::Canceled => Err(Error::State("builder was canceled")),
        }
    }

    /// Drops the temporary file after a failure, without surfacing cleanup errors.
    fn abort(&mut self) {
        self.state = BuildState::Canceled;
        self.buckets = Vec::new();
        self.out = None;
    }

    fn commit(&self, out: Output, buckets: &[Vec<PendingSlot>], sync: bool) -> Result<()> {
        let Output { mut file, tmp_path } = out;
        let tmp = tmp_path.to_path_buf();
        let io_err = |e: io::Error| Error::file(&tmp, e);

        // Pad the record region so slot tables start 16-byte aligned.
        let pad = padding_for(self.pos);
        file.write_all(&[PAD_BYTE; 16][..pad as usize]).map_err(io_err)?;
        let mut pos = self.pos + pad;

        let width = SlotWidth::for_data_end(pos);
        let mut header = vec![0u8; HEADER_BYTES];
        let mut table: Vec<u8> = Vec::new();

        for (i, pending) in buckets.iter().enumerate() {
            // Two slots per record keeps probe chains short.
            let hslots = (pending.len() as u32) * 2;
            format::write_bucket(
                &mut header[i * BUCKET_DESC_BYTES..][..BUCKET_DESC_BYTES],
                BucketDesc { hpos: pos, hslots },
            );

            table.clear();
            table.resize(hslots as usize * width.bytes() as usize, 0);
            fill_slot_table(&mut table, pending, hslots, width);
            file.write_all(&table).map_err(io_err)?;
            pos += table.len() as u64;
        }

        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        file.write_all(&header).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        let file = file.into_inner().map_err(|e| io_err(e.into_error()))?;

        set_mode(&file, self.mode).map_err(io_err)?;
        if sync {
            file.sync_data().map_err(io_err)?;
        }
        // Close before rename; NFS may only report write errors here.
        drop(file);

        tmp_path
            .persist(&self.path)
            .map_err(|e| Error::file(&self.path, e.error))?;

        if sync {
            sync_parent_dir(&self.path);
        }
        Ok(())
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        if self.out.is_some() {
            debug!(path = %self.path.display(), "builder dropped before finish; discarding");
        }
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("records", &self.records)
            .field("bytes", &self.pos)
            .finish()
    }
}

/// Places every pending entry into its bucket's slot table by linear
/// probing from the hash-derived start slot.
///
/// Entries are placed in insertion order, so the occurrences of one key sit
/// along its probe sequence in the order they were added.
fn fill_slot_table(table: &mut [u8], pending: &[PendingSlot], hslots: u32, width: SlotWidth) {
    let step = width.bytes() as usize;
    for p in pending {
        let mut u = start_slot(p.hash, hslots);
        // Terminates: the table has twice as many slots as entries.
        while !format::slot_is_empty(&table[u as usize * step..][..step], width) {
            u += 1;
            if u == hslots {
                u = 0;
            }
        }
        format::write_slot(
            &mut table[u as usize * step..][..step],
            width,
            Slot {
                hash: p.hash,
                klen: Some(p.klen),
                dpos: p.dpos,
            },
        );
    }
}

fn write_record<W: Write>(w: &mut W, key: &[u8], value: &[u8]) -> io::Result<()> {
    w.write_all(&record::encode_header(key.len() as u32, value.len() as u32))?;
    w.write_all(key)?;
    w.write_all(value)
}

fn check_len(what: &'static str, len: usize) -> Result<()> {
    if len as u64 > MAX_FIELD_LEN {
        return Err(Error::Limit {
            what,
            len: len as u64,
            limit: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Picks the permission bits for the committed file.
fn resolve_mode(path: &Path, requested: Option<u32>) -> Result<u32> {
    match fs::metadata(path) {
        Ok(md) if !md.is_file() => Err(Error::file(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "target exists and is not a regular file"),
        )),
        Ok(md) => Ok(requested.unwrap_or_else(|| existing_mode(&md))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(requested.unwrap_or(DEFAULT_MODE)),
        Err(e) => Err(Error::file(path, e)),
    }
}

#[cfg(unix)]
fn existing_mode(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn existing_mode(md: &fs::Metadata) -> u32 {
    if md.permissions().readonly() {
        DEFAULT_MODE
    } else {
        0o644
    }
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    let mut perms = file.metadata()?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    file.set_permissions(perms)
}

/// Fsyncs the directory holding `path` so a completed rename is durable.
/// Best effort: some platforms cannot open directories.
fn sync_parent_dir(path: &Path) {
    let dir = parent_dir(path);
    match File::open(dir).and_then(|d| d.sync_all()) {
        Ok(()) => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "directory fsync failed"),
    }
}
