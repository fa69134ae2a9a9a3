//! # djb hash
//!
//! The 32-bit byte-string hash that places keys into an mcdb file.
//!
//! The function is part of the on-disk format: every builder and reader must
//! agree on it bit for bit, otherwise lookups land in the wrong bucket. It is
//! Dan Bernstein's cdb hash:
//!
//! ```text
//! h = 5381
//! for each byte c: h = ((h << 5) + h) ^ c      (wrapping, 32-bit)
//! ```
//!
//! ## Usage in mcdb
//!
//! The low 8 bits select one of the 256 buckets in the file header; the
//! remaining bits pick the starting slot inside that bucket's open-addressed
//! slot table.
//!
//! ## Example
//!
//! ```rust
//! use hash::{djb_hash, DjbHasher};
//!
//! let mut h = DjbHasher::new();
//! h.update(b"hel");
//! h.update(b"lo");
//! assert_eq!(h.finish32(), djb_hash(b"hello"));
//! ```

/// Initial hash state.
pub const DJB_INIT: u32 = 5381;

/// Hashes a whole byte string in one call.
#[inline]
#[must_use]
pub fn djb_hash(data: &[u8]) -> u32 {
    djb_update(DJB_INIT, data)
}

/// Folds `data` into an existing hash state `h`.
#[inline]
#[must_use]
pub fn djb_update(h: u32, data: &[u8]) -> u32 {
    data.iter()
        .fold(h, |h, &c| h.wrapping_add(h << 5) ^ u32::from(c))
}

/// Incremental djb hasher.
///
/// Feeding a key in several pieces yields the same value as hashing it in one
/// go, which lets callers hash keys that arrive in chunks (e.g. while parsing
/// a stream) without buffering them first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DjbHasher {
    state: u32,
}

impl DjbHasher {
    /// Creates a hasher in the initial state.
    #[must_use]
    pub fn new() -> Self {
        Self { state: DJB_INIT }
    }

    /// Appends `data` to the hashed input.
    pub fn update(&mut self, data: &[u8]) {
        self.state = djb_update(self.state, data);
    }

    /// Returns the 32-bit hash of everything fed so far.
    #[must_use]
    pub fn finish32(&self) -> u32 {
        self.state
    }
}

impl Default for DjbHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::hash::Hasher for DjbHasher {
    /// The 32-bit state, zero-extended.
    fn finish(&self) -> u64 {
        u64::from(self.state)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

impl std::fmt::Debug for DjbHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DjbHasher")
            .field("state", &format_args!("{:#010x}", self.state))
            .finish()
    }
}

#[cfg(test)]
mod tests;
