//! # mcdbctl - mcdb command line tool
//!
//! Builds, queries and inspects mcdb constant databases.
//!
//! ## Commands
//!
//! ```text
//! mcdbctl make  <db> <input|->         Build <db> from cdbmake text (file or stdin)
//! mcdbctl get   <db> <key> [seq|all]   Print the value of <key> (occurrence seq, or all)
//! mcdbctl dump  <db>                   Print every record in cdbmake format
//! mcdbctl stats <db>                   Print record count and probe-distance histogram
//! mcdbctl uniq  <db> [first|last]      Rewrite <db> keeping one value per key
//! ```
//!
//! ## Exit status
//!
//! ```text
//! 0     success
//! 1     error (message on stderr)
//! 2     usage error
//! 100   get: key (or occurrence) not found
//! ```
//!
//! ## Configuration
//!
//! ```text
//! MCDB_MODE   octal mode for databases written by make/uniq  (default: keep, else 0400)
//! MCDB_SYNC   fsync before the atomic rename                 (default: "true")
//! MCDB_LOG    log filter, e.g. "debug" or "mcdb=trace"       (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ printf '+1,1:a->b\n+1,1:c->d\n+1,2:c->dd\n\n' | mcdbctl make data.mcdb -
//! $ mcdbctl get data.mcdb c 1
//! dd
//! $ mcdbctl get data.mcdb c all
//! d
//! dd
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::{env_or, Advice, BuildConfig, ENV_LOG};
use mcdb::{makefmt, Builder, Reader};
use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Exit status of `get` when the key or occurrence does not exist.
const EXIT_NOT_FOUND: u8 = 100;

#[derive(Parser)]
#[command(name = "mcdbctl", version, about = "mcdb constant database tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a database from cdbmake text.
    Make {
        /// Database to create or replace.
        db: PathBuf,
        /// Input file, or "-" for stdin.
        input: PathBuf,
    },
    /// Print the value of a key.
    Get {
        db: PathBuf,
        /// Key bytes; need not be valid UTF-8.
        key: OsString,
        /// Occurrence number (0 = first), or "all".
        #[arg(default_value = "0")]
        which: Which,
    },
    /// Print every record in cdbmake format.
    Dump { db: PathBuf },
    /// Print the record count and probe-distance histogram.
    Stats { db: PathBuf },
    /// Rewrite a database so every key occurs once.
    Uniq {
        db: PathBuf,
        /// Which occurrence of a duplicated key survives.
        #[arg(value_enum, default_value_t = Keep::First)]
        keep: Keep,
    },
}

/// Occurrence selector for `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    Nth(usize),
    All,
}

impl FromStr for Which {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Which::All);
        }
        s.parse()
            .map(Which::Nth)
            .map_err(|_| format!("expected a sequence number or \"all\", got {:?}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Keep {
    First,
    Last,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mcdbctl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_new(env_or(ENV_LOG, "warn")).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Make { db, input } => make(&db, &input),
        Command::Get { db, key, which } => get(&db, key_bytes(&key)?, which),
        Command::Dump { db } => dump(&db),
        Command::Stats { db } => stats(&db),
        Command::Uniq { db, keep } => uniq(&db, keep),
    }
}

#[cfg(unix)]
fn key_bytes(key: &OsStr) -> Result<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Ok(key.as_bytes())
}

#[cfg(not(unix))]
fn key_bytes(key: &OsStr) -> Result<&[u8]> {
    key.to_str()
        .map(str::as_bytes)
        .context("key is not valid UTF-8")
}

fn open(db: &Path) -> Result<Reader> {
    Reader::open(db).with_context(|| format!("cannot open {}", db.display()))
}

fn make(db: &Path, input: &Path) -> Result<ExitCode> {
    let source: Box<dyn BufRead> = if input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        let f = File::open(input).with_context(|| format!("cannot read {}", input.display()))?;
        Box::new(BufReader::new(f))
    };

    let config = BuildConfig::from_env();
    let mut records = 0;
    Builder::create(db, config, |b| {
        records = makefmt::load(source, b)?;
        Ok(())
    })
    .with_context(|| format!("cannot build {}", db.display()))?;

    info!(db = %db.display(), records, "database built");
    Ok(ExitCode::SUCCESS)
}

fn get(db: &Path, key: &[u8], which: Which) -> Result<ExitCode> {
    let r = open(db)?;
    let values: Vec<&[u8]> = match which {
        Which::Nth(n) => r.lookup_nth(key, n)?.into_iter().collect(),
        Which::All => r.find_all(key)?,
    };
    if values.is_empty() {
        return Ok(ExitCode::from(EXIT_NOT_FOUND));
    }

    // Values are arbitrary bytes; write them raw.
    let mut out = BufWriter::new(io::stdout().lock());
    for v in values {
        out.write_all(v)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn dump(db: &Path) -> Result<ExitCode> {
    let r = open(db)?;
    r.advise(Advice::Sequential)?;
    let n = makefmt::dump(&r, BufWriter::new(io::stdout().lock()))?;
    debug!(db = %db.display(), records = n, "dumped");
    Ok(ExitCode::SUCCESS)
}

fn stats(db: &Path) -> Result<ExitCode> {
    let r = open(db)?;
    r.advise(Advice::Sequential)?;
    let stats = r
        .stats()
        .with_context(|| format!("{} failed validation", db.display()))?;
    print!("{}", stats);
    Ok(ExitCode::SUCCESS)
}

fn uniq(db: &Path, keep: Keep) -> Result<ExitCode> {
    let r = open(db)?;
    r.advise(Advice::Sequential)?;
    if r.has_unique_keys()? {
        info!(db = %db.display(), "keys already unique; nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    // Each key keeps its first position in build order; `last` swaps in the
    // value of its final occurrence.
    let last: Option<HashMap<&[u8], &[u8]>> = match keep {
        Keep::First => None,
        Keep::Last => Some(r.to_map()?),
    };
    let mut seen = HashSet::new();
    let kept: Vec<(&[u8], &[u8])> = r
        .pairs()?
        .into_iter()
        .filter(|(k, _)| seen.insert(*k))
        .map(|(k, v)| match &last {
            Some(map) => (k, map.get(k).copied().unwrap_or(v)),
            None => (k, v),
        })
        .collect();

    // The old image stays mapped until `r` drops, so reading it while the
    // replacement is renamed into place is fine.
    Builder::create(db, BuildConfig::from_env(), |b| {
        for (k, v) in &kept {
            b.add(k, v)?;
        }
        Ok(())
    })
    .with_context(|| format!("cannot rewrite {}", db.display()))?;

    info!(db = %db.display(), records = kept.len(), "duplicates removed");
    Ok(ExitCode::SUCCESS)
}
