//! Sorted Table Module
//!
//! Immutable, block-indexed, on-disk sorted tables stored as JSON lines,
//! plus the operations that live on top of them: streaming writes, block
//! reads, point lookups, and the L0 → L1 merge.
//!
//! ## Design Overview
//!
//! A sorted table is a pair of files under a level directory:
//!
//! ```text
//! L<level>/<ulid>.jsonl          # data: one {"key", "value"} object per line,
//!                                #       ascending by key
//! L<level>/<ulid>.index.jsonl    # one index entry per block:
//!                                #       {"block", "first_key", "offset", "record_count"}
//! ```
//!
//! Records are grouped into fixed-record-count **blocks**; the index is
//! dense in blocks and sparse in keys, so a point lookup needs one index
//! read and one block read. File ids are ULIDs, so lexicographic order
//! on names is creation order — a level's *visibility cursor* (largest
//! committed file id) is just a string to compare against.
//!
//! `L0/` files may overlap (each is a memtable snapshot); `L1/` files
//! hold disjoint key ranges. Deleted keys travel as records whose value
//! is the [`TOMBSTONE`] sentinel.
//!
//! # Sub-modules
//!
//! - [`writer`] — [`TableWriter`]: streaming single- and split-file writes,
//!   file removal and retention.
//! - [`reader`] — [`TableReader`]: listing, index/block reads, key ranges,
//!   and the one-block-at-a-time [`TableCursor`].
//! - [`search`] — [`TableSearch`]: point lookup inside one level.
//! - [`compact`] — [`TableCompactor`]: overlap-aware L0 → L1 merge.
//!
//! # Guarantees
//!
//! - **Immutability** — a table is never modified once written; updates
//!   arrive as new files.
//! - **Ordering** — records within a file are strictly ascending by key.
//! - **Bounded reads** — lookups touch one block; merge cursors hold one
//!   block per input file.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod compact;
pub mod reader;
pub mod search;
pub mod writer;

#[cfg(test)]
mod tests;

pub use compact::TableCompactor;
pub use reader::{TableCursor, TableReader};
pub use search::TableSearch;
pub use writer::TableWriter;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Sentinel value marking a deleted key. Carried through every tier so
/// a deeper live copy can never resurface.
pub const TOMBSTONE: &str = "__TOMBSTONE__";

/// Suffix appended to a search source tag when the hit was a tombstone.
pub const TOMBSTONE_SOURCE: &str = "-x";

/// Extension of data files.
pub const DATA_EXT: &str = ".jsonl";

/// Extension of index files.
pub const INDEX_EXT: &str = ".index.jsonl";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by sorted-table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A data or index line failed to encode or decode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// On-disk state contradicts its own index.
    #[error("corrupt table: {0}")]
    Corrupt(String),

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Line-level structures
// ------------------------------------------------------------------------------------------------

/// File id of a sorted table — the ULID shared by its data and index
/// files.
pub type FileId = String;

/// One data-file line: a key and its opaque value.
///
/// A record whose value is the [`TOMBSTONE`] sentinel marks the key as
/// deleted at this tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub key: String,
    pub value: Value,
}

impl TableRecord {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// A deletion marker for `key`.
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Value::String(TOMBSTONE.to_string()),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        value_is_tombstone(&self.value)
    }
}

/// Whether a value is the deletion sentinel.
pub fn value_is_tombstone(value: &Value) -> bool {
    value.as_str() == Some(TOMBSTONE)
}

/// One index-file line describing one block of the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Block ordinal within the file, starting at 0.
    pub block: u64,

    /// Key of the block's first record.
    pub first_key: String,

    /// Byte offset of the block's first record in the data file.
    pub offset: u64,

    /// Number of records in the block.
    pub record_count: u64,
}

// ------------------------------------------------------------------------------------------------
// Level configuration
// ------------------------------------------------------------------------------------------------

/// Shape of the files at one level.
#[derive(Debug, Clone, Copy)]
pub struct LevelConfig {
    /// Records per block.
    pub block_size: usize,

    /// Blocks per file — caps output file size during split writes.
    pub blocks_per_file: usize,

    /// Minimum files the level should be split into when compaction
    /// rewrites it. `1` (or `0`) disables splitting.
    pub min_files: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            block_size: 10,
            blocks_per_file: 20,
            min_files: 2,
        }
    }
}

/// Per-level configuration map. Levels without an explicit entry use
/// [`LevelConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    levels: BTreeMap<u32, LevelConfig>,
}

impl TableConfig {
    pub fn new(levels: BTreeMap<u32, LevelConfig>) -> Self {
        Self { levels }
    }

    pub fn for_level(&self, level: u32) -> LevelConfig {
        self.levels.get(&level).copied().unwrap_or_default()
    }

    /// Replaces the configuration for one level.
    pub fn set_level(&mut self, level: u32, config: LevelConfig) {
        self.levels.insert(level, config);
    }
}

// ------------------------------------------------------------------------------------------------
// Path helpers
// ------------------------------------------------------------------------------------------------

/// Directory of one level under the data root: `<root>/L<level>`.
pub fn level_dir(root: &Path, level: u32) -> PathBuf {
    root.join(format!("L{level}"))
}

/// Data-file path for a file id inside a level directory.
pub fn data_path(folder: &Path, file_id: &str) -> PathBuf {
    folder.join(format!("{file_id}{DATA_EXT}"))
}

/// Index-file path for a file id inside a level directory.
pub fn index_path(folder: &Path, file_id: &str) -> PathBuf {
    folder.join(format!("{file_id}{INDEX_EXT}"))
}
