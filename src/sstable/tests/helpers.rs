use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::sstable::{TableError, TableRecord};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call from every
/// test — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `key-<n>` records with a numeric payload, ascending.
pub fn numbered_records(range: std::ops::Range<usize>) -> Vec<TableRecord> {
    range
        .map(|i| TableRecord::new(format!("key-{i:03}"), json!({"n": i})))
        .collect()
}

/// Wraps owned records into the fallible stream the writer consumes.
pub fn stream(
    records: Vec<TableRecord>,
) -> impl Iterator<Item = Result<TableRecord, TableError>> {
    records.into_iter().map(Ok)
}
