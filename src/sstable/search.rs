//! Point lookup inside one level.
//!
//! Level 0 files may overlap, so the lookup walks them newest-first and
//! the first file containing the key — live or tombstone — answers for
//! the whole level. Level 1 files are disjoint, so at most one file can
//! hold the key and a binary search over first keys finds it.
//!
//! Tombstones are returned as-is; translating them into "not found" is
//! the coordinator's job.

use serde_json::Value;
use tracing::trace;

use super::reader::TableReader;
use super::{FileId, TableError, level_dir};
use crate::lsn::LSN_MAX;

/// Key lookup across one level of the sorted-table tree.
///
/// Delegates all file I/O to an existing [`TableReader`].
#[derive(Debug)]
pub struct TableSearch<'a> {
    reader: &'a TableReader,
}

impl<'a> TableSearch<'a> {
    pub fn new(reader: &'a TableReader) -> Self {
        Self { reader }
    }

    /// Returns the value stored for `key` at `level`, or `None` when no
    /// visible file contains it. A tombstone hit returns the sentinel
    /// value unchanged.
    ///
    /// `last_id` bounds visibility for levels ≥ 1. Level 0 visibility is
    /// governed by the coordinator's flush bookkeeping, so the cursor is
    /// ignored there and every L0 file is eligible.
    pub fn search(
        &self,
        key: &str,
        level: u32,
        last_id: &str,
    ) -> Result<Option<Value>, TableError> {
        if !level_dir(self.reader.root(), level).exists() {
            return Ok(None);
        }

        let last_id = if level == 0 { LSN_MAX } else { last_id };
        let file_ids = self.reader.list_file_ids(level, last_id)?;
        if file_ids.is_empty() {
            return Ok(None);
        }

        if level == 0 {
            self.search_level_zero(key, level, file_ids)
        } else {
            self.search_level_n(key, level, file_ids)
        }
    }

    // --------------------------------------------------------------------------------------------
    // Level-specific search
    // --------------------------------------------------------------------------------------------

    /// Possibly-overlapping files: newest first (descending ULID is
    /// descending creation time). The first file that contains the key
    /// is authoritative; no further files are consulted.
    fn search_level_zero(
        &self,
        key: &str,
        level: u32,
        mut file_ids: Vec<FileId>,
    ) -> Result<Option<Value>, TableError> {
        file_ids.sort_by(|a, b| b.cmp(a));

        for file_id in &file_ids {
            if let Some(value) = self.lookup_in_file(key, level, file_id)? {
                trace!(key, level, %file_id, "L0 hit");
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Disjoint files: only the rightmost file whose `first_key ≤ key`
    /// can contain the key.
    fn search_level_n(
        &self,
        key: &str,
        level: u32,
        file_ids: Vec<FileId>,
    ) -> Result<Option<Value>, TableError> {
        let mut file_ranges: Vec<(String, FileId)> = Vec::new();
        for file_id in file_ids {
            let index = self.reader.read_index(level, &file_id)?;
            if let Some(first) = index.first() {
                file_ranges.push((first.first_key.clone(), file_id));
            }
        }
        if file_ranges.is_empty() {
            return Ok(None);
        }

        file_ranges.sort();

        let idx = file_ranges.partition_point(|(first_key, _)| first_key.as_str() <= key);
        let Some((_, candidate)) = idx.checked_sub(1).map(|i| &file_ranges[i]) else {
            return Ok(None);
        };

        self.lookup_in_file(key, level, candidate)
    }

    // --------------------------------------------------------------------------------------------
    // File-level search: index binary search → seek → block scan
    // --------------------------------------------------------------------------------------------

    /// Binary-searches the rightmost block whose `first_key ≤ key`,
    /// reads that one block, and scans it. The scan aborts as soon as a
    /// record's key exceeds the target — records are sorted.
    fn lookup_in_file(
        &self,
        key: &str,
        level: u32,
        file_id: &str,
    ) -> Result<Option<Value>, TableError> {
        let index = self.reader.read_index(level, file_id)?;
        match index.first() {
            None => return Ok(None),
            Some(first) if key < first.first_key.as_str() => return Ok(None),
            Some(_) => {}
        }

        let idx = index.partition_point(|entry| entry.first_key.as_str() <= key);
        let entry = &index[idx - 1];

        for record in self.reader.read_block(level, file_id, entry)? {
            if record.key == key {
                return Ok(Some(record.value));
            }
            if record.key.as_str() > key {
                break;
            }
        }

        Ok(None)
    }
}
