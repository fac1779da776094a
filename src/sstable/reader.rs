//! Sorted-table reader — listings, index and block reads, key ranges,
//! and streaming cursors.
//!
//! Every read is bounded: an index read loads one small sibling file, a
//! block read seeks to the block's byte offset and decodes exactly
//! `record_count` lines, and a [`TableCursor`] keeps a single block of
//! records resident while walking a whole file.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::trace;

use super::{
    DATA_EXT, FileId, INDEX_EXT, IndexEntry, TableError, TableRecord, data_path, index_path,
    level_dir,
};
use crate::lsn::LSN_MIN;

/// Read-side access to the sorted tables under one data root.
#[derive(Debug)]
pub struct TableReader {
    root: PathBuf,
}

impl TableReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data root this reader is mounted on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File ids at `level` that are visible under `last_id`
    /// (`file_id ≤ last_id`). An empty cursor means nothing is visible.
    /// Result order is unspecified; callers sort as needed.
    pub fn list_file_ids(&self, level: u32, last_id: &str) -> Result<Vec<FileId>, TableError> {
        let folder = level_dir(&self.root, level);
        if !folder.exists() {
            return Ok(Vec::new());
        }

        let last_id = if last_id.trim().is_empty() {
            LSN_MIN
        } else {
            last_id.trim()
        };

        let mut ids = Vec::new();
        for entry in fs::read_dir(&folder)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(INDEX_EXT) || !name.ends_with(DATA_EXT) {
                continue;
            }
            let Some(file_id) = name.strip_suffix(DATA_EXT) else {
                continue;
            };
            // "wal" never passes: lowercase sorts above every uppercase
            // ULID cursor, LSN_MAX included.
            if file_id <= last_id {
                ids.push(file_id.to_string());
            }
        }

        Ok(ids)
    }

    /// The block index of a file, in block order.
    pub fn read_index(&self, level: u32, file_id: &str) -> Result<Vec<IndexEntry>, TableError> {
        let folder = level_dir(&self.root, level);
        let file = File::open(index_path(&folder, file_id))?;

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }

    /// The records of one block, in file order.
    pub fn read_block(
        &self,
        level: u32,
        file_id: &str,
        entry: &IndexEntry,
    ) -> Result<Vec<TableRecord>, TableError> {
        let folder = level_dir(&self.root, level);
        let mut file = BufReader::new(File::open(data_path(&folder, file_id))?);
        read_block_at(&mut file, file_id, entry)
    }

    /// `(first_key, last_key)` of a file, or `None` for a file with an
    /// empty index.
    ///
    /// The first key comes straight from the index; the last key needs
    /// one read of the final block. This is the only reader operation
    /// that touches a file body during compaction planning.
    pub fn get_key_range(
        &self,
        level: u32,
        file_id: &str,
    ) -> Result<Option<(String, String)>, TableError> {
        let index = self.read_index(level, file_id)?;
        let (Some(first), Some(last)) = (index.first(), index.last()) else {
            return Ok(None);
        };

        let first_key = first.first_key.clone();
        let last_block = self.read_block(level, file_id, last)?;
        let last_key = match last_block.last() {
            Some(record) => record.key.clone(),
            None => first_key.clone(),
        };

        Ok(Some((first_key, last_key)))
    }

    /// Sum of `record_count` over every visible index entry at `level`.
    pub fn level_key_count(&self, level: u32, last_id: &str) -> Result<u64, TableError> {
        let mut count = 0;
        for file_id in self.list_file_ids(level, last_id)? {
            for entry in self.read_index(level, &file_id)? {
                count += entry.record_count;
            }
        }
        Ok(count)
    }

    /// Opens a streaming cursor over a file, positioned on the first
    /// record of the first block. Returns `None` for a file with an
    /// empty index or an empty first block.
    ///
    /// `priority` is a caller-supplied tie-break: when two cursors carry
    /// the same key during a merge, the lower priority wins.
    pub fn make_cursor(
        &self,
        level: u32,
        file_id: &str,
        priority: u8,
    ) -> Result<Option<TableCursor>, TableError> {
        let index = self.read_index(level, file_id)?;
        let Some(first_entry) = index.first() else {
            return Ok(None);
        };

        let folder = level_dir(&self.root, level);
        let mut file = BufReader::new(File::open(data_path(&folder, file_id))?);
        let records = read_block_at(&mut file, file_id, first_entry)?;
        if records.is_empty() {
            return Ok(None);
        }

        trace!(level, file_id, priority, "cursor opened");

        Ok(Some(TableCursor {
            records,
            pos: 0,
            priority,
            file_id: file_id.to_string(),
            index,
            block_idx: 0,
            file,
        }))
    }
}

// ------------------------------------------------------------------------------------------------
// TableCursor
// ------------------------------------------------------------------------------------------------

/// Streaming cursor over one sorted table.
///
/// Holds exactly one block's worth of records plus its own file handle;
/// advancing past the current block seeks to the next block's offset and
/// swaps the resident records. Used by the compaction merge, where one
/// cursor per input file bounds memory to `O(block_size × fan-in)`.
#[derive(Debug)]
pub struct TableCursor {
    records: Vec<TableRecord>,
    pos: usize,
    priority: u8,
    file_id: FileId,
    index: Vec<IndexEntry>,
    block_idx: usize,
    file: BufReader<File>,
}

impl TableCursor {
    /// The record the cursor is positioned on.
    pub fn current(&self) -> &TableRecord {
        &self.records[self.pos]
    }

    /// Merge tie-break priority (lower wins).
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// File id this cursor walks.
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Moves to the next record, loading the next block when the
    /// resident one is exhausted. Returns `false` once the file is
    /// fully consumed.
    pub fn advance(&mut self) -> Result<bool, TableError> {
        if self.pos + 1 < self.records.len() {
            self.pos += 1;
            return Ok(true);
        }

        let next_block_idx = self.block_idx + 1;
        let Some(entry) = self.index.get(next_block_idx) else {
            return Ok(false);
        };

        let records = read_block_at(&mut self.file, &self.file_id, entry)?;
        if records.is_empty() {
            return Ok(false);
        }

        self.records = records;
        self.pos = 0;
        self.block_idx = next_block_idx;
        Ok(true)
    }
}

// ------------------------------------------------------------------------------------------------
// Block I/O
// ------------------------------------------------------------------------------------------------

/// Seeks to an index entry's offset and decodes exactly
/// `record_count` lines.
///
/// A data file that runs out before the declared count is corrupt: the
/// index promises records the file does not hold.
fn read_block_at(
    file: &mut BufReader<File>,
    file_id: &str,
    entry: &IndexEntry,
) -> Result<Vec<TableRecord>, TableError> {
    file.seek(SeekFrom::Start(entry.offset))?;

    let mut records = Vec::with_capacity(entry.record_count as usize);
    let mut line = String::new();
    for _ in 0..entry.record_count {
        line.clear();
        if file.read_line(&mut line)? == 0 {
            return Err(TableError::Corrupt(format!(
                "{file_id}: block {} declares {} records but the data file ended early",
                entry.block, entry.record_count
            )));
        }
        records.push(serde_json::from_str(line.trim_end())?);
    }

    Ok(records)
}
