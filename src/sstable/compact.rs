//! L0 → L1 compaction.
//!
//! One round consumes the **oldest** L0 file and merges it with the L1
//! files whose key ranges it overlaps; untouched L1 files survive as
//! they are. Planning reads only indexes (plus one block per file for
//! key ranges); the merge itself streams one block per input file.
//!
//! ## Algorithm
//!
//! 1. Pick the oldest L0 file. No L0 files → no-op returning the
//!    currently visible L1 set.
//! 2. Read its `[min, max]` key range, then partition visible L1 files
//!    into *overlapping* and *untouched* by range intersection.
//! 3. Plan split boundaries: collect every block `first_key` from the
//!    inputs and pick `min_files − 1` evenly spaced ones.
//! 4. K-way merge the L0 cursor (priority 0) with the overlapping L1
//!    cursors (priority 1): smallest key first, lowest priority on ties,
//!    duplicates of an emitted key dropped — the newer level already
//!    answered for that key.
//! 5. Stream the merge through a split write into new L1 files.
//!
//! Tombstones pass through to L1 unchanged: with only two disk tiers
//! there is no lower level that could still hold a shadowed live copy,
//! but a two-tier engine also never reaches a point where dropping them
//! is provably safe.
//!
//! The caller removes the consumed L0 file and prunes superseded L1
//! files via [`TableWriter::preserve_files`] once the new files are on
//! disk; visibility only advances after both steps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use super::reader::{TableCursor, TableReader};
use super::writer::TableWriter;
use super::{FileId, TableConfig, TableError, TableRecord, level_dir};
use crate::lsn::LSN_MAX;

/// Merges L0 snapshots into the split, non-overlapping L1 tier.
#[derive(Debug)]
pub struct TableCompactor {
    config: TableConfig,
    reader: TableReader,
    writer: TableWriter,
}

impl TableCompactor {
    pub fn new(root: impl Into<PathBuf>, config: TableConfig) -> Self {
        let root = root.into();
        Self {
            config,
            reader: TableReader::new(root.clone()),
            writer: TableWriter::new(root),
        }
    }

    /// Runs one compaction round against the L1 set visible under
    /// `last_l1_id`.
    ///
    /// Returns the consumed L0 file id (`None` when L0 was empty) and
    /// the full list of L1 file ids that should survive: untouched files
    /// plus the freshly written outputs. The caller feeds that list to
    /// [`TableWriter::preserve_files`] and advances the L1 cursor to its
    /// maximum.
    pub fn compact_level_zero(
        &self,
        last_l1_id: &str,
    ) -> Result<(Option<FileId>, Vec<FileId>), TableError> {
        fs::create_dir_all(level_dir(self.reader.root(), 1))?;

        let Some(l0_id) = self.oldest_file_id(0)? else {
            debug!("compaction: L0 empty, nothing to do");
            return Ok((None, self.reader.list_file_ids(1, last_l1_id)?));
        };

        let Some((l0_min, l0_max)) = self.reader.get_key_range(0, &l0_id)? else {
            debug!(%l0_id, "compaction: selected L0 file has an empty index");
            return Ok((None, self.reader.list_file_ids(1, last_l1_id)?));
        };

        let (overlapping, untouched) =
            self.partition_level_files(1, &l0_min, &l0_max, last_l1_id)?;
        debug!(
            %l0_id,
            %l0_min,
            %l0_max,
            overlapping = overlapping.len(),
            untouched = untouched.len(),
            "compaction: L1 overlap partition"
        );

        let split_keys = self.plan_split_keys(&l0_id, &overlapping, 1)?;

        let l1_cfg = self.config.for_level(1);
        let merged = self.merge_records(&l0_id, &overlapping)?;
        let new_ids =
            self.writer
                .write_split(1, merged, &split_keys, l1_cfg.block_size, l1_cfg.blocks_per_file)?;

        info!(
            %l0_id,
            inputs = overlapping.len() + 1,
            outputs = new_ids.len(),
            "compaction round complete"
        );

        let mut surviving = untouched;
        surviving.extend(new_ids);
        Ok((Some(l0_id), surviving))
    }

    /// Largest file id present at `level`, ignoring visibility cursors.
    /// Used to seed the L1 cursor when an engine opens over existing
    /// data.
    pub fn newest_file_id(&self, level: u32) -> Result<Option<FileId>, TableError> {
        Ok(self.reader.list_file_ids(level, LSN_MAX)?.into_iter().max())
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    fn oldest_file_id(&self, level: u32) -> Result<Option<FileId>, TableError> {
        Ok(self.reader.list_file_ids(level, LSN_MAX)?.into_iter().min())
    }

    /// Splits the visible files at `level` into those whose key range
    /// intersects `[from_min, from_max]` and those untouched by it.
    /// Only key ranges are read — one index plus one block per file.
    fn partition_level_files(
        &self,
        level: u32,
        from_min: &str,
        from_max: &str,
        last_id: &str,
    ) -> Result<(Vec<FileId>, Vec<FileId>), TableError> {
        let mut overlapping = Vec::new();
        let mut untouched = Vec::new();

        for file_id in self.reader.list_file_ids(level, last_id)? {
            let Some((file_min, file_max)) = self.reader.get_key_range(level, &file_id)? else {
                untouched.push(file_id);
                continue;
            };
            if file_min.as_str() <= from_max && file_max.as_str() >= from_min {
                overlapping.push(file_id);
            } else {
                untouched.push(file_id);
            }
        }

        Ok((overlapping, untouched))
    }

    /// Picks `min_files − 1` evenly spaced split boundaries from the
    /// block first-keys of every input file, deduplicated and sorted.
    /// Index-only reads.
    ///
    /// Boundary indices are `i·len/n` rounded half-to-even, clamped to
    /// the key list (the rounded index can land one past the end for
    /// tiny key lists with a large fan-out).
    fn plan_split_keys(
        &self,
        l0_id: &str,
        overlapping: &[FileId],
        to_level: u32,
    ) -> Result<Vec<String>, TableError> {
        let n = self.config.for_level(to_level).min_files;
        if n <= 1 {
            return Ok(Vec::new());
        }

        let mut all_keys: Vec<String> = Vec::new();
        for entry in self.reader.read_index(0, l0_id)? {
            all_keys.push(entry.first_key);
        }
        for file_id in overlapping {
            for entry in self.reader.read_index(to_level, file_id)? {
                all_keys.push(entry.first_key);
            }
        }
        if all_keys.is_empty() {
            return Ok(Vec::new());
        }

        all_keys.sort();

        let len = all_keys.len();
        let mut split_keys: Vec<String> = (1..n)
            .map(|i| {
                let idx = round_half_to_even(i * len, n);
                all_keys[idx.min(len - 1)].clone()
            })
            .collect();
        split_keys.sort();
        split_keys.dedup();

        debug!(?split_keys, candidates = len, "compaction: split plan");
        Ok(split_keys)
    }

    /// Builds one cursor per input file and wires them into a
    /// [`MergeIterator`]. The L0 cursor gets priority 0 so its records
    /// win ties against the older L1 data.
    fn merge_records(
        &self,
        l0_id: &str,
        overlapping: &[FileId],
    ) -> Result<MergeIterator, TableError> {
        let mut cursors = Vec::new();

        if let Some(cursor) = self.reader.make_cursor(0, l0_id, 0)? {
            cursors.push(cursor);
        }
        for file_id in overlapping {
            if let Some(cursor) = self.reader.make_cursor(1, file_id, 1)? {
                cursors.push(cursor);
            }
        }

        Ok(MergeIterator::new(cursors))
    }
}

/// `numerator / denominator` rounded half-to-even: an exact half goes
/// to the even neighbor, so `5/2` rounds to 2 and `3/2` to 2.
///
/// Integer arithmetic keeps the half test exact; floating-point rounding
/// would send every half up instead.
fn round_half_to_even(numerator: usize, denominator: usize) -> usize {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    match (2 * remainder).cmp(&denominator) {
        Ordering::Less => quotient,
        Ordering::Greater => quotient + 1,
        Ordering::Equal => quotient + (quotient % 2),
    }
}

// ------------------------------------------------------------------------------------------------
// MergeIterator — heap-based k-way merge over table cursors
// ------------------------------------------------------------------------------------------------

/// K-way ordered merge over streaming [`TableCursor`]s.
///
/// Yields records in ascending key order. When two cursors carry the
/// same key, the lower-priority cursor pops first and later copies of
/// that key are dropped — the first emission is authoritative. Each
/// cursor keeps one block resident, so the whole merge is
/// `O(block_size × fan-in)` in memory.
pub struct MergeIterator {
    cursors: Vec<TableCursor>,
    heap: BinaryHeap<MergeHeapEntry>,
    last_key: Option<String>,
}

struct MergeHeapEntry {
    key: String,
    priority: u8,
    cursor_idx: usize,
}

impl Ord for MergeHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so the smallest (key, priority) pops first.
        (&self.key, self.priority)
            .cmp(&(&other.key, other.priority))
            .reverse()
    }
}

impl PartialOrd for MergeHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.priority == other.priority
    }
}

impl Eq for MergeHeapEntry {}

impl MergeIterator {
    pub fn new(cursors: Vec<TableCursor>) -> Self {
        let mut heap = BinaryHeap::new();
        for (cursor_idx, cursor) in cursors.iter().enumerate() {
            heap.push(MergeHeapEntry {
                key: cursor.current().key.clone(),
                priority: cursor.priority(),
                cursor_idx,
            });
        }

        Self {
            cursors,
            heap,
            last_key: None,
        }
    }
}

impl Iterator for MergeIterator {
    type Item = Result<TableRecord, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.heap.pop()?;
            let cursor = &mut self.cursors[entry.cursor_idx];
            let record = cursor.current().clone();

            match cursor.advance() {
                Ok(true) => self.heap.push(MergeHeapEntry {
                    key: cursor.current().key.clone(),
                    priority: cursor.priority(),
                    cursor_idx: entry.cursor_idx,
                }),
                Ok(false) => {}
                Err(e) => return Some(Err(e)),
            }

            // Same key from a lower-priority source: already emitted.
            if self.last_key.as_deref() == Some(record.key.as_str()) {
                continue;
            }

            self.last_key = Some(record.key.clone());
            return Some(Ok(record));
        }
    }
}
