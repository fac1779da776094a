//! # LSM Coordinator
//!
//! Threads the storage subsystems together: routes writes through the
//! WAL into the memtable, flushes a full memtable to L0, drives L0 → L1
//! compaction, performs top-down lookups, and replays the WAL on
//! start-up.
//!
//! ## Write path
//!
//! ```text
//! save ──► flush_if_full? ──► validate ──► WAL append ──► memtable insert
//!              │                                              (fresh LSN)
//!              └─► write L0 table, swap memtable,
//!                  advance last_ids[0], unlink WAL
//! ```
//!
//! ## Read path
//!
//! Memtable first, then level 0 … max, stopping at the first hit.
//! Tombstone hits count as hits — they mask anything deeper — and are
//! reported with a `-x` source tag so the caller can tell "deleted"
//! from "never written".
//!
//! ## Visibility
//!
//! `last_ids[level]` holds the largest file id considered committed at
//! each level. Level 0 starts at [`LSN_MAX`] (every flushed file is
//! visible); level 1 advances only after a compaction has written its
//! outputs **and** pruned the superseded inputs. A crash in between
//! leaves orphans above the cursor, invisible until reaped.
//!
//! ## Guarantees
//!
//! - **Durability** — the WAL line precedes the memtable mutation; the
//!   WAL is unlinked only after its contents are on disk in L0.
//! - **Ordering** — every mutation carries a strictly increasing LSN,
//!   and the memtable rejects regressions.
//! - **Single writer** — all operations run on the caller's thread;
//!   there is no background flusher or compactor.

pub mod input;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::lsn::{LSN_MAX, LSN_MIN, SequenceError, SequenceIssuer};
use crate::memtable::{Memtable, MemtableError};
use crate::sstable::{
    DATA_EXT, FileId, TOMBSTONE, TOMBSTONE_SOURCE, TableCompactor, TableConfig, TableError,
    TableReader, TableSearch, TableWriter, value_is_tombstone,
};
use crate::wal::{Wal, WalError};

pub use input::{ValidationError, make_key, sanitize_key};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error originating from the memtable.
    #[error("memtable error: {0}")]
    Memtable(#[from] MemtableError),

    /// Error originating from the write-ahead log.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Error originating from the sorted-table subsystem.
    #[error("sorted table error: {0}")]
    Table(#[from] TableError),

    /// Malformed input at the save boundary.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The LSN issuer failed.
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Live memtable entries before the next save triggers a flush.
    pub max_memtable_count: usize,

    /// Records per block when the memtable is flushed to L0.
    pub memtable_block_size: usize,

    /// Deepest sorted-table level. The compactor only feeds L1, so this
    /// is 1 in practice.
    pub max_level: u32,

    /// Per-level block shape and split fan-out for the sorted tables.
    pub levels: TableConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_memtable_count: 100,
            memtable_block_size: 10,
            max_level: 1,
            levels: TableConfig::default(),
        }
    }
}

/// Per-level record count reported by [`Engine::level_counts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCount {
    pub level: u32,
    pub key_count: u64,
}

/// Snapshot of entry counts across the memtable and every level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCounts {
    /// Live entries in the memtable.
    pub memtable: usize,

    /// Visible record counts per level, empty when only the memtable
    /// was asked for.
    pub levels: Vec<LevelCount>,
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// The storage engine handle — the only entry point to the LSM tree.
///
/// Owns one data root outright. Pointing two instances at the same root
/// is undefined behaviour at the contract level (last writer wins on
/// every file).
#[derive(Debug)]
pub struct Engine {
    data_root: PathBuf,
    config: EngineConfig,
    memtable: Memtable,
    wal: Wal,
    issuer: SequenceIssuer,
    reader: TableReader,
    writer: TableWriter,
    compactor: TableCompactor,
    /// Largest committed file id per level. A missing entry means
    /// nothing at that level is visible.
    last_ids: HashMap<u32, FileId>,
}

impl Engine {
    /// Opens (or creates) an engine rooted at `path`.
    ///
    /// Seeds the visibility cursors — level 0 sees everything, level 1
    /// sees up to the newest file already on disk — and replays any
    /// leftover WAL into the fresh memtable.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let data_root = path.as_ref().to_path_buf();
        fs::create_dir_all(&data_root)?;

        let compactor = TableCompactor::new(&data_root, config.levels.clone());

        let mut last_ids = HashMap::new();
        last_ids.insert(0, LSN_MAX.to_string());
        if let Some(newest_l1) = compactor.newest_file_id(1)? {
            last_ids.insert(1, newest_l1);
        }

        let mut engine = Self {
            memtable: Memtable::new(config.memtable_block_size),
            wal: Wal::open(&data_root)?,
            issuer: SequenceIssuer::new(),
            reader: TableReader::new(&data_root),
            writer: TableWriter::new(&data_root),
            compactor,
            last_ids,
            config,
            data_root,
        };

        let replayed = engine.restore()?;
        info!(
            path = %engine.data_root.display(),
            replayed,
            last_l1 = engine.last_ids.get(&1).map(String::as_str).unwrap_or("-"),
            "engine opened"
        );

        Ok(engine)
    }

    /// Validates and stores one reading for a customer.
    ///
    /// Returns the sanitised key the value was stored under.
    pub fn save(&mut self, customer_id: &str, raw: &str) -> Result<String, EngineError> {
        // 1. A full memtable is flushed before the new write lands.
        self.flush_if_full()?;

        // 2. Boundary validation — rejected input never touches the WAL.
        let (key, value) = input::parse_save_input(customer_id, raw)?;

        // 3. WAL first (crash safety), then the memtable.
        self.wal.append(&key, &value)?;
        let lsn = self.issuer.next()?;
        self.memtable.insert(key.clone(), value, lsn)?;

        Ok(key)
    }

    /// Looks a key up across every tier, newest first.
    ///
    /// Returns the value (or `None`) plus a source tag: `MT` or `L<i>`
    /// for live hits, `MT-x` / `L<i>-x` when the authoritative record
    /// was a tombstone, and `L<max>` on a full miss.
    pub fn search(&self, key: &str) -> Result<(Option<Value>, String), EngineError> {
        if let Some(entry) = self.memtable.search(key) {
            if entry.is_tombstone() {
                return Ok((None, format!("MT{TOMBSTONE_SOURCE}")));
            }
            return Ok((Some(entry.value.clone()), "MT".to_string()));
        }

        let search = TableSearch::new(&self.reader);
        for level in 0..=self.config.max_level {
            let last_id = self.visible_cursor(level);
            if let Some(value) = search.search(key, level, last_id)? {
                if value_is_tombstone(&value) {
                    return Ok((None, format!("L{level}{TOMBSTONE_SOURCE}")));
                }
                return Ok((Some(value), format!("L{level}")));
            }
        }

        Ok((None, format!("L{}", self.config.max_level)))
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// The tombstone takes the usual route — WAL line first, then the
    /// memtable — so it both survives a crash and masks deeper copies.
    pub fn delete(&mut self, key: &str) -> Result<(), EngineError> {
        let tombstone = Value::String(TOMBSTONE.to_string());
        self.wal.append(key, &tombstone)?;

        let lsn = self.issuer.next()?;
        self.memtable.delete(key, lsn)?;

        debug!(key, "key tombstoned");
        Ok(())
    }

    /// Flushes the memtable to a new L0 table and installs a fresh one.
    ///
    /// The WAL is unlinked only after the table is written — its
    /// contents are then durable in L0. An empty memtable flushes to
    /// nothing and returns `None`.
    pub fn flush(&mut self) -> Result<Option<FileId>, EngineError> {
        let block_size = self.memtable.block_size();
        let full = std::mem::replace(&mut self.memtable, Memtable::new(block_size));

        match self
            .writer
            .write(0, block_size, full.iter_for_flush().map(Ok))?
        {
            Some((_, file_id)) => {
                self.last_ids.insert(0, file_id.clone());
                self.wal.delete()?;
                info!(%file_id, "memtable flushed to L0");
                Ok(Some(file_id))
            }
            None => Ok(None),
        }
    }

    /// Merges the oldest L0 file into L1.
    ///
    /// After the compactor returns, the consumed L0 file is removed,
    /// every L1 file not in the surviving set is pruned, and only then
    /// does the L1 visibility cursor advance. Returns the new cursor.
    pub fn compact(&mut self) -> Result<Option<FileId>, EngineError> {
        let last_l1 = self.visible_cursor(1).to_string();
        let (consumed, surviving) = self.compactor.compact_level_zero(&last_l1)?;

        if let Some(l0_id) = &consumed {
            self.writer.remove_file(0, l0_id)?;
        }

        let newest = self.writer.preserve_files(1, &surviving)?;
        match &newest {
            Some(id) => {
                self.last_ids.insert(1, id.clone());
            }
            None => {
                self.last_ids.remove(&1);
            }
        }

        info!(
            consumed = consumed.as_deref().unwrap_or("-"),
            surviving = surviving.len(),
            last_l1 = newest.as_deref().unwrap_or("-"),
            "compaction applied"
        );
        Ok(newest)
    }

    /// Entry counts: memtable live entries, and (unless `memtable_only`)
    /// the visible record count of every level.
    pub fn level_counts(&self, memtable_only: bool) -> Result<LevelCounts, EngineError> {
        let mut counts = LevelCounts {
            memtable: self.memtable.count(),
            levels: Vec::new(),
        };
        if memtable_only {
            return Ok(counts);
        }

        for level in 0..=self.config.max_level {
            let key_count = self
                .reader
                .level_key_count(level, self.visible_cursor(level))?;
            counts.levels.push(LevelCount { level, key_count });
        }

        Ok(counts)
    }

    /// Live memtable keys in ascending order.
    pub fn memtable_keys(&self) -> Vec<String> {
        self.memtable.ordered_keys().map(str::to_string).collect()
    }

    /// Wipes every `*.jsonl` under the data root and resets the
    /// in-memory state. Armed only by the literal confirmation `"Y"`;
    /// anything else is a no-op returning `false`.
    pub fn truncate(&mut self, confirm: &str) -> Result<bool, EngineError> {
        if confirm.trim().to_uppercase() != "Y" {
            return Ok(false);
        }

        let removed = remove_data_files(&self.data_root)?;
        self.memtable = Memtable::new(self.config.memtable_block_size);
        self.wal.delete()?;
        self.last_ids.clear();
        self.last_ids.insert(0, LSN_MAX.to_string());

        info!(removed, "data root truncated");
        Ok(true)
    }

    /// Replays the WAL into the current memtable, assigning fresh LSNs
    /// in replay order. Tombstone lines become deletes. Returns the
    /// number of mutations replayed.
    pub fn restore(&mut self) -> Result<usize, EngineError> {
        if !self.wal.exists() {
            return Ok(0);
        }

        let mut restored = 0;
        for record in self.wal.replay_iter()? {
            let record = record?;
            let lsn = self.issuer.next()?;
            if value_is_tombstone(&record.value) {
                self.memtable.delete(record.key, lsn)?;
            } else {
                self.memtable.insert(record.key, record.value, lsn)?;
            }
            restored += 1;
        }

        info!(restored, "memtable restored from WAL");
        Ok(restored)
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    /// Flushes when the memtable has reached its configured capacity.
    fn flush_if_full(&mut self) -> Result<Option<FileId>, EngineError> {
        if self.memtable.count() >= self.config.max_memtable_count {
            return self.flush();
        }
        Ok(None)
    }

    /// The visibility cursor for a level; a missing entry means nothing
    /// is visible.
    fn visible_cursor(&self, level: u32) -> &str {
        self.last_ids
            .get(&level)
            .map(String::as_str)
            .unwrap_or(LSN_MIN)
    }
}

// ------------------------------------------------------------------------------------------------
// Filesystem helpers
// ------------------------------------------------------------------------------------------------

/// Recursively removes every `*.jsonl` file under `dir`. Returns the
/// number of files removed.
fn remove_data_files(dir: &Path) -> Result<usize, io::Error> {
    let mut removed = 0;
    if !dir.exists() {
        return Ok(removed);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            removed += remove_data_files(&path)?;
            continue;
        }

        let is_data_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.to_lowercase().ends_with(DATA_EXT));
        if is_data_file {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}
