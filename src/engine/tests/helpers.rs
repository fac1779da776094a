use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineConfig};
use crate::sstable::{LevelConfig, TableConfig};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call multiple
/// times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Large memtable — saves never trigger a flush on their own.
pub fn memtable_only_config() -> EngineConfig {
    init_tracing();
    EngineConfig {
        max_memtable_count: 10_000,
        ..EngineConfig::default()
    }
}

/// Small memtable and small blocks, so a handful of saves exercises the
/// flush and compaction paths. L1 splits into at least two files.
pub fn small_config(max_memtable_count: usize) -> EngineConfig {
    init_tracing();
    let mut levels = TableConfig::default();
    levels.set_level(
        1,
        LevelConfig {
            block_size: 2,
            blocks_per_file: 100,
            min_files: 2,
        },
    );
    EngineConfig {
        max_memtable_count,
        memtable_block_size: 2,
        max_level: 1,
        levels,
    }
}

/// Saves `count` distinct single-customer readings, keys
/// `<customer>#room-<i>`.
pub fn save_rooms(engine: &mut Engine, customer: &str, count: usize) {
    for i in 0..count {
        engine
            .save(customer, &format!("room-{i:03},72F,50"))
            .expect("save");
    }
}

/// Data files (excluding indexes and the WAL) currently under `L<level>/`.
pub fn level_data_files(root: &std::path::Path, level: u32) -> Vec<String> {
    let folder = root.join(format!("L{level}"));
    if !folder.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = std::fs::read_dir(&folder)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".jsonl") && !n.ends_with(".index.jsonl") && n != "wal.jsonl")
        .collect();
    names.sort();
    names
}
