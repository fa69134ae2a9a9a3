//! Error taxonomy for the engine.
//!
//! Absence of a key is **not** an error: lookups return `Ok(None)`. Every
//! variant here is a real failure, and [`Error::kind`] lets callers (for
//! example a language binding) map failures onto their own exception types.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by [`Builder`](crate::Builder) and [`Reader`](crate::Reader).
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation on a known file failed.
    #[error("io error on {}: {source}", path.display())]
    File {
        /// File or directory the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// An I/O error without a file to blame (e.g. writing a dump to stdout).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The database image (or text input) is malformed.
    #[error("malformed data at offset {offset}: {reason}")]
    Format {
        /// Byte offset where the problem was detected.
        offset: u64,
        /// Human readable description.
        reason: String,
    },

    /// The operation is not legal in the session's current lifecycle state.
    #[error("invalid state: {0}")]
    State(&'static str),

    /// A key, value or record count exceeds what the format can address.
    #[error("{what} of {len} exceeds the limit of {limit}")]
    Limit {
        /// What overflowed ("key length", "record count", ...).
        what: &'static str,
        /// Offending size.
        len: u64,
        /// Maximum allowed.
        limit: u64,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File create/read/write/rename/mmap failure.
    Io,
    /// Malformed header, out-of-bounds offsets, truncated record.
    Format,
    /// Operation outside its legal lifecycle state.
    State,
    /// Input too large for the format.
    Limit,
}

impl Error {
    pub(crate) fn file<P: AsRef<Path>>(path: P, source: io::Error) -> Self {
        Error::File {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(offset: u64, reason: impl Into<String>) -> Self {
        Error::Format {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns the class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::File { .. } | Error::Io(_) => ErrorKind::Io,
            Error::Format { .. } => ErrorKind::Format,
            Error::State(_) => ErrorKind::State,
            Error::Limit { .. } => ErrorKind::Limit,
        }
    }

    /// Returns `true` if the error is an I/O failure caused by a missing file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::File { source, .. } | Error::Io(source) => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
