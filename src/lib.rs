//! # SedimentDB
//!
//! An embeddable, crash-tolerant key-value storage engine built on a
//! **two-tier Log-Structured Merge Tree (LSM-tree)**. Writes land in an
//! in-memory ordered buffer, survive crashes through a write-ahead log,
//! and settle into immutable JSON-line sorted tables on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                       Engine                           │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────┐   │
//! │  │  Memtable  │   │  L0 tables   │   │  L1 tables  │   │
//! │  │  + WAL     │   │ (overlapping)│   │  (disjoint) │   │
//! │  └─────┬──────┘   └──────┬───────┘   └──────▲──────┘   │
//! │        │    flush        │    compact       │          │
//! │        └────────────►    └──────────────────┘          │
//! │                                                        │
//! │  Lookup order: memtable → L0 (newest first) → L1       │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Coordinator — save, search, delete, flush, compact, restore |
//! | [`memtable`] | In-memory ordered write buffer with tombstones and LSN ordering |
//! | [`wal`] | Append-only JSON-line write-ahead log, truncated on flush |
//! | [`sstable`] | Immutable block-indexed sorted tables: writer, reader, search, compactor |
//! | [`lsn`] | Monotonic log sequence numbers (ULID strings) |
//!
//! ## Key Properties
//!
//! - **Write-ahead logging** — every mutation hits the WAL before the
//!   memtable, so replay reconstructs the buffer lost in a crash.
//! - **LSN ordering** — each mutation carries a lexicographically
//!   comparable sequence token; a stale write is rejected rather than
//!   silently reordered.
//! - **Tombstone propagation** — deletes flow from the memtable through
//!   L0 into L1 so a deeper live copy can never resurface.
//! - **Overlap-aware compaction** — one L0 file at a time is merged into
//!   L1, rewriting only the L1 files whose key ranges it touches.
//! - **Visibility cursors** — searches only see files at or below each
//!   level's committed file id, so half-written compaction output is
//!   never read.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sedimentdb::engine::{Engine, EngineConfig};
//!
//! let mut engine = Engine::open("/tmp/sensors", EngineConfig::default()).unwrap();
//!
//! // Write a reading: "<room-device>,<temperature><F|C>,<humidity>"
//! engine.save("0000001", "kitchen,72F,50").unwrap();
//!
//! // Read it back; the tag names the tier that answered.
//! let (_value, source) = engine.search("0000001#kitchen").unwrap();
//! assert_eq!(source, "MT");
//!
//! // Delete, then merge L0 into L1.
//! engine.delete("0000001#kitchen").unwrap();
//! engine.flush().unwrap();
//! engine.compact().unwrap();
//! ```

pub mod engine;
pub mod lsn;
pub mod memtable;
pub mod sstable;
pub mod wal;

pub use engine::{Engine, EngineConfig, EngineError};
