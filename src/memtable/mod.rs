//! # Memtable Module
//!
//! The in-memory ordered write buffer of the storage engine.
//!
//! ## Design Invariants
//!
//! - Each key appears at most once; a mutation overwrites in place.
//! - Every entry carries the LSN of the mutation that produced it, and
//!   that LSN never decreases: a mutation presenting an older LSN fails
//!   with [`MemtableError::WriteSequence`].
//! - Deletes are tombstones, not physical removals — a delete of an
//!   absent key still inserts a tombstone so the deletion propagates to
//!   the sorted tables on flush.
//! - `count()` tracks **live** entries only; tombstones are excluded.
//!
//! ## Flush Semantics
//!
//! [`Memtable::iter_for_flush`] walks the tree in ascending key order
//! and yields **every** entry, tombstones included. The coordinator
//! feeds that stream to the sorted-table writer; the memtable itself is
//! not mutated by flush iteration.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::lsn::Lsn;
use crate::sstable::{TOMBSTONE, TableRecord, value_is_tombstone};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Memtable`] operations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// A mutation presented an LSN older than the one already stored
    /// for the key. This is an invariant violation on the write path,
    /// not an expected runtime condition.
    #[error("write sequence violation for {key}: stored LSN {stored} > incoming {incoming}")]
    WriteSequence {
        key: String,
        stored: Lsn,
        incoming: Lsn,
    },
}

// ------------------------------------------------------------------------------------------------
// Entry
// ------------------------------------------------------------------------------------------------

/// One key's current state: its value (possibly the tombstone sentinel)
/// and the LSN of the mutation that set it.
#[derive(Debug, Clone, PartialEq)]
pub struct MemtableEntry {
    pub value: Value,
    pub lsn: Lsn,
}

impl MemtableEntry {
    pub fn is_tombstone(&self) -> bool {
        value_is_tombstone(&self.value)
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable Core
// ------------------------------------------------------------------------------------------------

/// Ordered in-memory index with tombstones and LSN-checked writes.
///
/// Backed by a `BTreeMap` — the engine needs O(log n) point operations
/// plus ascending-key iteration for flush, and the standard B-tree gives
/// both without bookkeeping of its own.
#[derive(Debug)]
pub struct Memtable {
    tree: BTreeMap<String, MemtableEntry>,
    live_count: usize,
    block_size: usize,
}

impl Memtable {
    /// Creates an empty memtable. `block_size` is the records-per-block
    /// grouping used when this memtable is flushed to an L0 table.
    pub fn new(block_size: usize) -> Self {
        Self {
            tree: BTreeMap::new(),
            live_count: 0,
            block_size,
        }
    }

    /// Records-per-block grouping applied at flush.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Inserts or overwrites a key.
    ///
    /// Overwriting a tombstone revives the key (the live count goes back
    /// up). An LSN older than the stored one is rejected.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: Value,
        lsn: Lsn,
    ) -> Result<(), MemtableError> {
        let key = key.into();

        match self.tree.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().lsn > lsn {
                    return Err(MemtableError::WriteSequence {
                        key: occupied.key().clone(),
                        stored: occupied.get().lsn.clone(),
                        incoming: lsn,
                    });
                }
                let entry = occupied.get_mut();
                if entry.is_tombstone() {
                    self.live_count += 1;
                }
                entry.value = value;
                entry.lsn = lsn;
            }
            Entry::Vacant(vacant) => {
                trace!(key = %vacant.key(), %lsn, "memtable insert (new key)");
                vacant.insert(MemtableEntry { value, lsn });
                self.live_count += 1;
            }
        }

        Ok(())
    }

    /// Replaces a key's value with the tombstone sentinel.
    ///
    /// An absent key gets a tombstone entry so the deletion reaches L0
    /// on flush and masks any deeper live copy. The LSN ordering check
    /// applies exactly as for inserts.
    pub fn delete(&mut self, key: impl Into<String>, lsn: Lsn) -> Result<(), MemtableError> {
        let key = key.into();
        let tombstone = Value::String(TOMBSTONE.to_string());

        match self.tree.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().lsn > lsn {
                    return Err(MemtableError::WriteSequence {
                        key: occupied.key().clone(),
                        stored: occupied.get().lsn.clone(),
                        incoming: lsn,
                    });
                }
                let entry = occupied.get_mut();
                if !entry.is_tombstone() {
                    self.live_count -= 1;
                }
                entry.value = tombstone;
                entry.lsn = lsn;
            }
            Entry::Vacant(vacant) => {
                trace!(key = %vacant.key(), %lsn, "memtable delete (absent key, tombstone inserted)");
                vacant.insert(MemtableEntry {
                    value: tombstone,
                    lsn,
                });
            }
        }

        Ok(())
    }

    /// The stored entry for a key, tombstones included.
    pub fn search(&self, key: &str) -> Option<&MemtableEntry> {
        self.tree.get(key)
    }

    /// Number of live (non-tombstoned) entries.
    pub fn count(&self) -> usize {
        self.live_count
    }

    /// Live keys in ascending order.
    pub fn ordered_keys(&self) -> impl Iterator<Item = &str> {
        self.tree
            .iter()
            .filter(|(_, entry)| !entry.is_tombstone())
            .map(|(key, _)| key.as_str())
    }

    /// Every entry — tombstones included — in ascending key order,
    /// shaped for the sorted-table writer. Tombstones must reach L0 so
    /// searches below the memtable still see the deletion.
    pub fn iter_for_flush(&self) -> impl Iterator<Item = TableRecord> + '_ {
        self.tree
            .iter()
            .map(|(key, entry)| TableRecord::new(key.clone(), entry.value.clone()))
    }
}
