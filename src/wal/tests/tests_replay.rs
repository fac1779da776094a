use serde_json::json;
use tempfile::TempDir;

use crate::wal::{Wal, WalRecord};

#[test]
fn replay_preserves_write_order() {
    let tmp = TempDir::new().unwrap();
    let wal = Wal::open(tmp.path()).unwrap();

    for i in 0..20 {
        wal.append(&format!("key-{i:02}"), &json!({"seq": i}))
            .unwrap();
    }

    let keys: Vec<String> = wal
        .replay_iter()
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect();

    let expected: Vec<String> = (0..20).map(|i| format!("key-{i:02}")).collect();
    assert_eq!(keys, expected);
}

#[test]
fn replay_of_absent_log_is_empty() {
    let tmp = TempDir::new().unwrap();
    let wal = Wal::open(tmp.path()).unwrap();

    assert_eq!(wal.replay_iter().unwrap().count(), 0);
}

#[test]
fn duplicate_keys_replay_as_separate_records() {
    let tmp = TempDir::new().unwrap();
    let wal = Wal::open(tmp.path()).unwrap();

    wal.append("k", &json!("first")).unwrap();
    wal.append("k", &json!("second")).unwrap();

    let records: Vec<WalRecord> = wal.replay_iter().unwrap().map(Result::unwrap).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].value, json!("first"));
    assert_eq!(records[1].value, json!("second"));
}

#[test]
fn blank_lines_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let wal = Wal::open(tmp.path()).unwrap();

    wal.append("k", &json!("v")).unwrap();
    std::fs::write(
        wal.path(),
        "{\"key\":\"k\",\"value\":\"v\"}\n\n{\"key\":\"k2\",\"value\":\"v2\"}\n",
    )
    .unwrap();

    let records: Vec<_> = wal.replay_iter().unwrap().map(Result::unwrap).collect();
    assert_eq!(records.len(), 2);
}

#[test]
fn malformed_line_surfaces_as_error() {
    let tmp = TempDir::new().unwrap();
    let wal = Wal::open(tmp.path()).unwrap();

    std::fs::write(wal.path(), "{\"key\":\"k\",\"value\":\"v\"}\nnot-json\n").unwrap();

    let results: Vec<_> = wal.replay_iter().unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}
