use serde_json::json;
use tempfile::TempDir;

use super::helpers::memtable_only_config;
use crate::engine::{Engine, EngineError, ValidationError};

#[test]
fn save_then_search_hits_the_memtable() {
    let tmp = TempDir::new().unwrap();
    let mut engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    let key = engine.save("0000001", "kitchen,72F,50").unwrap();
    assert_eq!(key, "0000001#kitchen");

    let (value, source) = engine.search("0000001#kitchen").unwrap();
    assert_eq!(source, "MT");
    let value = value.unwrap();
    assert_eq!(value["temperature"], "72");
    assert_eq!(value["scale"], "F");
    assert_eq!(value["humidity"], "50");
}

#[test]
fn save_sanitises_the_key() {
    let tmp = TempDir::new().unwrap();
    let mut engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    let key = engine.save("Cust 42", "Living Room,72F,50").unwrap();
    assert_eq!(key, "cust-42#living-room");
    assert_eq!(engine.search("cust-42#living-room").unwrap().1, "MT");
}

#[test]
fn delete_then_revive() {
    let tmp = TempDir::new().unwrap();
    let mut engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    engine.save("0000001", "kitchen,72F,50").unwrap();
    engine.delete("0000001#kitchen").unwrap();

    let (value, source) = engine.search("0000001#kitchen").unwrap();
    assert!(value.is_none());
    assert_eq!(source, "MT-x");

    engine.save("0000001", "kitchen,80F,55").unwrap();
    let (value, source) = engine.search("0000001#kitchen").unwrap();
    assert_eq!(source, "MT");
    assert_eq!(value.unwrap()["temperature"], "80");
}

#[test]
fn full_miss_reports_the_deepest_level() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    let (value, source) = engine.search("nobody#nowhere").unwrap();
    assert!(value.is_none());
    assert_eq!(source, "L1");
}

#[test]
fn rejected_input_reaches_neither_wal_nor_memtable() {
    let tmp = TempDir::new().unwrap();
    let mut engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    let result = engine.save("0000001", "kitchen,very-hot,50");
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::Temperature))
    ));

    assert_eq!(engine.level_counts(true).unwrap().memtable, 0);
    assert!(!tmp.path().join("L0").join("wal.jsonl").exists());
}

#[test]
fn memtable_keys_lists_live_keys_in_order() {
    let tmp = TempDir::new().unwrap();
    let mut engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    engine.save("2", "kitchen,72F,50").unwrap();
    engine.save("1", "attic,104F,28").unwrap();
    engine.save("1", "garage,55F,60").unwrap();
    engine.delete("1#garage").unwrap();

    assert_eq!(engine.memtable_keys(), vec!["1#attic", "2#kitchen"]);
}

#[test]
fn values_are_opaque_to_the_engine() {
    let tmp = TempDir::new().unwrap();
    let mut engine = Engine::open(tmp.path(), memtable_only_config()).unwrap();

    engine.save("7", "wine-cellar,13C,70").unwrap();

    let (value, _) = engine.search("7#wine-cellar").unwrap();
    assert_eq!(
        value.unwrap(),
        json!({"temperature": "13", "scale": "C", "humidity": "70"})
    );
}
