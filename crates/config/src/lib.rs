//! # Config - shared constants and tool settings
//!
//! A small, immutable table of values shared by the engine and `mcdbctl`:
//!
//! - [`Advice`]: the access-pattern hints a reader may pass to the OS.
//! - [`BuildConfig`]: commit defaults (file mode, fsync) for new databases.
//!
//! Values are plain `Copy` data, built once and passed by value. Nothing here
//! is global or mutable.
//!
//! ## Environment
//!
//! ```text
//! MCDB_MODE   octal permission bits for new files   (default: keep/0400)
//! MCDB_SYNC   fsync before rename ("true"/"false")   (default: "true")
//! MCDB_LOG    log filter for mcdbctl                 (default: "warn")
//! ```

use std::fmt;
use std::str::FromStr;

/// Permission bits given to a freshly created database when the caller does
/// not pass a mode and no previous file exists. Databases are constant, so
/// read-only is the natural default.
pub const DEFAULT_MODE: u32 = 0o400;

/// Environment variable holding the octal file mode.
pub const ENV_MODE: &str = "MCDB_MODE";
/// Environment variable toggling fsync on commit.
pub const ENV_SYNC: &str = "MCDB_SYNC";
/// Environment variable holding the `mcdbctl` log filter.
pub const ENV_LOG: &str = "MCDB_LOG";

/// Expected access pattern over a mapped database.
///
/// Mirrors the POSIX `madvise` advice values. It is only a hint: no query
/// ever returns a different answer because of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Advice {
    /// No special treatment.
    #[default]
    Normal,
    /// Point lookups scattered over the file.
    Random,
    /// Full scans in file order (dump, iteration).
    Sequential,
    /// Pages will be needed soon; prefault them.
    WillNeed,
    /// Pages will not be needed soon.
    DontNeed,
}

impl Advice {
    /// All variants, in declaration order.
    pub const ALL: [Advice; 5] = [
        Advice::Normal,
        Advice::Random,
        Advice::Sequential,
        Advice::WillNeed,
        Advice::DontNeed,
    ];

    /// Lower-case name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Advice::Normal => "normal",
            Advice::Random => "random",
            Advice::Sequential => "sequential",
            Advice::WillNeed => "willneed",
            Advice::DontNeed => "dontneed",
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an [`Advice`] name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAdvice(pub String);

impl fmt::Display for UnknownAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown access advice: {}", self.0)
    }
}

impl std::error::Error for UnknownAdvice {}

impl FromStr for Advice {
    type Err = UnknownAdvice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Advice::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAdvice(s.to_string()))
    }
}

/// Commit settings for building a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    /// Permission bits for the committed file. `None` keeps the mode of the
    /// file being replaced, or uses [`DEFAULT_MODE`] for a new file.
    pub mode: Option<u32>,
    /// Force data to stable storage before the atomic rename.
    pub sync: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            mode: None,
            sync: true,
        }
    }
}

impl BuildConfig {
    /// Reads [`ENV_MODE`] and [`ENV_SYNC`], falling back to the defaults for
    /// unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`, so
    /// callers and tests can supply values without touching the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mode = lookup(ENV_MODE)
            .and_then(|m| parse_mode(&m))
            .or(defaults.mode);
        let sync = lookup(ENV_SYNC)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.sync);
        Self { mode, sync }
    }
}

/// Parses an octal mode string such as `"0644"`, `"644"` or `"0o644"`.
#[must_use]
pub fn parse_mode(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

/// Reads a configuration value from the environment, falling back to `default`.
#[must_use]
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests;
