//! Write-Ahead Logging (WAL) Module
//!
//! An **append-only**, JSON-line durability record for memtable
//! mutations. One `{"key": ..., "value": ...}` line is appended per
//! mutation, in write order; the file is unlinked once a flush has
//! persisted the same mutations to an L0 sorted table.
//!
//! # On-disk layout
//!
//! The log lives at `<data_root>/L0/wal.jsonl` and is absent when the
//! memtable is empty (fresh engine, or right after a flush):
//!
//! ```text
//! {"key":"cust#kitchen","value":{"temperature":"72","scale":"F","humidity":"50"}}
//! {"key":"cust#kitchen","value":"__TOMBSTONE__"}
//! ...
//! ```
//!
//! # Guarantees
//!
//! - **Write order** — lines appear in mutation order, so replay
//!   reproduces the memtable's happens-before within one process.
//! - **Unlink safety** — each `append` opens the file fresh in append
//!   mode. After the engine unlinks the log post-flush, the next append
//!   starts a new file instead of feeding a dead inode.
//! - **Idempotent delete** — removing an absent log is not an error.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::sstable::level_dir;

/// File name of the write-ahead log inside the `L0/` directory.
pub const WAL_FILE_NAME: &str = "wal.jsonl";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A log line failed to decode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// One logged mutation: the key and the value it was assigned.
///
/// Deletions carry the tombstone sentinel as their value, so a replayed
/// log reproduces deletes as well as inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub key: String,
    pub value: Value,
}

// ------------------------------------------------------------------------------------------------
// WAL Core
// ------------------------------------------------------------------------------------------------

/// The write-ahead log for one engine instance.
///
/// Holds only the path; every append opens the file in append mode so
/// the post-flush unlink is always respected (see the module docs).
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
}

impl Wal {
    /// Creates the handle for `<data_root>/L0/wal.jsonl`, creating the
    /// `L0/` directory if needed. The log file itself is only created
    /// by the first [`append`](Self::append).
    pub fn open(data_root: impl AsRef<Path>) -> Result<Self, WalError> {
        let l0_dir = level_dir(data_root.as_ref(), 0);
        fs::create_dir_all(&l0_dir)?;

        Ok(Self {
            path: l0_dir.join(WAL_FILE_NAME),
        })
    }

    /// Appends one mutation as a JSON line.
    ///
    /// The write goes straight to the OS; per-record fsync is not part
    /// of this engine's durability contract.
    pub fn append(&self, key: &str, value: &Value) -> Result<(), WalError> {
        let record = WalRecord {
            key: key.to_string(),
            value: value.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;

        trace!(key, bytes = line.len(), "WAL record appended");
        Ok(())
    }

    /// Returns an iterator replaying every logged mutation in write
    /// order. An absent log replays as empty.
    pub fn replay_iter(&self) -> Result<WalIter, WalError> {
        let lines = match File::open(&self.path) {
            Ok(file) => {
                debug!(path = %self.path.display(), "WAL replay started");
                Some(BufReader::new(file).lines())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(WalError::Io(e)),
        };

        Ok(WalIter { lines })
    }

    /// Unlinks the log. Idempotent: an absent file is not an error.
    pub fn delete(&self) -> Result<(), WalError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "WAL deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WalError::Io(e)),
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the log file currently exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// ------------------------------------------------------------------------------------------------
// WalIter
// ------------------------------------------------------------------------------------------------

/// Streaming replay iterator — one decoded line at a time.
///
/// `None` inside means the log file did not exist; the iterator is then
/// immediately exhausted.
#[derive(Debug)]
pub struct WalIter {
    lines: Option<Lines<BufReader<File>>>,
}

impl Iterator for WalIter {
    type Item = Result<WalRecord, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;

        for line in lines {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(WalError::Io(e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(WalError::Json));
        }

        None
    }
}
