use serde_json::json;
use tempfile::TempDir;

use super::helpers::{init_tracing, numbered_records, stream};
use crate::lsn::LSN_MAX;
use crate::sstable::{
    LevelConfig, TableCompactor, TableConfig, TableReader, TableRecord, TableWriter,
};

fn two_way_split_config() -> TableConfig {
    let mut config = TableConfig::default();
    config.set_level(
        1,
        LevelConfig {
            block_size: 2,
            blocks_per_file: 100,
            min_files: 2,
        },
    );
    config
}

/// Collects every record of a file through a streaming cursor.
fn collect_file(reader: &TableReader, level: u32, file_id: &str) -> Vec<TableRecord> {
    let mut cursor = reader.make_cursor(level, file_id, 0).unwrap().unwrap();
    let mut records = vec![cursor.current().clone()];
    while cursor.advance().unwrap() {
        records.push(cursor.current().clone());
    }
    records
}

#[test]
fn empty_level_zero_is_a_noop_returning_the_visible_set() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());
    let compactor = TableCompactor::new(tmp.path(), two_way_split_config());

    let (_, l1_id) = writer
        .write(1, 2, stream(numbered_records(0..4)))
        .unwrap()
        .unwrap();

    let (consumed, surviving) = compactor.compact_level_zero(&l1_id).unwrap();

    assert!(consumed.is_none());
    assert_eq!(surviving, vec![l1_id]);
}

#[test]
fn first_compaction_splits_into_min_files() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());
    let reader = TableReader::new(tmp.path());
    let compactor = TableCompactor::new(tmp.path(), two_way_split_config());

    // One L0 file, 10 records in 2-record blocks → 5 block boundaries.
    writer
        .write(0, 2, stream(numbered_records(0..10)))
        .unwrap()
        .unwrap();

    let (consumed, surviving) = compactor.compact_level_zero("").unwrap();

    assert!(consumed.is_some());
    assert_eq!(surviving.len(), 2);

    // Disjoint, ascending, and jointly complete.
    let range_a = reader.get_key_range(1, &surviving[0]).unwrap().unwrap();
    let range_b = reader.get_key_range(1, &surviving[1]).unwrap().unwrap();
    assert!(range_a.1 < range_b.0 || range_b.1 < range_a.0);

    // Five block boundaries, one split at index round(5/2): the half
    // rounds to the even index 2, so the boundary is key-004 rather
    // than key-006.
    let mut ranges = vec![range_a, range_b];
    ranges.sort();
    assert_eq!(ranges[0], ("key-000".to_string(), "key-003".to_string()));
    assert_eq!(ranges[1], ("key-004".to_string(), "key-009".to_string()));

    let mut all_keys: Vec<String> = surviving
        .iter()
        .flat_map(|id| collect_file(&reader, 1, id))
        .map(|r| r.key)
        .collect();
    all_keys.sort();
    let expected: Vec<String> = (0..10).map(|i| format!("key-{i:03}")).collect();
    assert_eq!(all_keys, expected);
}

#[test]
fn oldest_level_zero_file_is_consumed_first() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());
    let compactor = TableCompactor::new(tmp.path(), two_way_split_config());

    let (_, older) = writer
        .write(0, 2, stream(numbered_records(0..4)))
        .unwrap()
        .unwrap();
    let (_, newer) = writer
        .write(0, 2, stream(numbered_records(4..8)))
        .unwrap()
        .unwrap();
    assert!(older < newer);

    let (consumed, _) = compactor.compact_level_zero("").unwrap();
    assert_eq!(consumed, Some(older));
}

#[test]
fn level_zero_wins_ties_and_untouched_files_survive() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());
    let reader = TableReader::new(tmp.path());
    let compactor = TableCompactor::new(tmp.path(), two_way_split_config());

    // Overlapped L1 file holds stale values for key-000..key-003.
    let stale: Vec<TableRecord> = (0..4)
        .map(|i| TableRecord::new(format!("key-{i:03}"), json!("stale")))
        .collect();
    let (_, overlapped) = writer.write(1, 2, stream(stale)).unwrap().unwrap();

    // Disjoint L1 file far above the L0 range.
    let far: Vec<TableRecord> = ["zulu-1", "zulu-2"]
        .iter()
        .map(|k| TableRecord::new(*k, json!("far")))
        .collect();
    let (_, untouched) = writer.write(1, 2, stream(far)).unwrap().unwrap();

    // L0 snapshot: fresh values for 000..003 plus a new key and a
    // tombstone.
    let mut l0_records: Vec<TableRecord> = (0..4)
        .map(|i| TableRecord::new(format!("key-{i:03}"), json!("fresh")))
        .collect();
    l0_records.push(TableRecord::new("key-004", json!("new")));
    l0_records.push(TableRecord::tombstone("key-005"));
    writer.write(0, 2, stream(l0_records)).unwrap().unwrap();

    let last_l1 = untouched.clone().max(overlapped.clone());
    let (consumed, surviving) = compactor.compact_level_zero(&last_l1).unwrap();
    assert!(consumed.is_some());

    // The untouched file is passed through; the overlapped one is not.
    assert!(surviving.contains(&untouched));
    assert!(!surviving.contains(&overlapped));

    let merged: Vec<TableRecord> = surviving
        .iter()
        .filter(|id| **id != untouched)
        .flat_map(|id| collect_file(&reader, 1, id))
        .collect();

    for record in &merged {
        match record.key.as_str() {
            "key-004" => assert_eq!(record.value, json!("new")),
            "key-005" => assert!(record.is_tombstone(), "tombstone must reach L1"),
            _ => assert_eq!(record.value, json!("fresh"), "{}: L0 must win", record.key),
        }
    }
    assert_eq!(merged.len(), 6);
}

#[test]
fn merge_emits_strictly_ascending_keys() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());
    let reader = TableReader::new(tmp.path());
    let compactor = TableCompactor::new(tmp.path(), two_way_split_config());

    let (_, l1_id) = writer
        .write(1, 3, stream(numbered_records(0..20)))
        .unwrap()
        .unwrap();
    writer
        .write(0, 3, stream(numbered_records(5..15)))
        .unwrap()
        .unwrap();

    let (_, surviving) = compactor.compact_level_zero(&l1_id).unwrap();

    let mut keys = Vec::new();
    let mut sorted_ids = surviving.clone();
    sorted_ids.sort();
    for id in &sorted_ids {
        keys.extend(collect_file(&reader, 1, id).into_iter().map(|r| r.key));
    }

    let expected: Vec<String> = (0..20).map(|i| format!("key-{i:03}")).collect();
    assert_eq!(keys, expected, "one record per key, ascending");
}

#[test]
fn split_disabled_when_min_files_is_one() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());

    let mut config = TableConfig::default();
    config.set_level(
        1,
        LevelConfig {
            block_size: 2,
            blocks_per_file: 100,
            min_files: 1,
        },
    );
    let compactor = TableCompactor::new(tmp.path(), config);

    writer
        .write(0, 2, stream(numbered_records(0..10)))
        .unwrap()
        .unwrap();

    let (_, surviving) = compactor.compact_level_zero("").unwrap();
    assert_eq!(surviving.len(), 1);
}

#[test]
fn newest_file_id_ignores_visibility() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let writer = TableWriter::new(tmp.path());
    let compactor = TableCompactor::new(tmp.path(), TableConfig::default());

    assert!(compactor.newest_file_id(1).unwrap().is_none());

    writer
        .write(1, 10, stream(numbered_records(0..2)))
        .unwrap()
        .unwrap();
    let (_, newest) = writer
        .write(1, 10, stream(numbered_records(2..4)))
        .unwrap()
        .unwrap();

    assert_eq!(compactor.newest_file_id(1).unwrap(), Some(newest));

    // Level listing under the max cursor still sees both files.
    let reader = TableReader::new(tmp.path());
    assert_eq!(reader.list_file_ids(1, LSN_MAX).unwrap().len(), 2);
}
