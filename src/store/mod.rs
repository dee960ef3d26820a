//! Pluggable bulk-write storage for converted survey responses.
//!
//! The import coordinator only needs three operations, so the storage
//! backend is a trait. [`JsonlStore`] appends records as JSON lines under
//! a data directory and is what the CLI and server use; [`MemoryStore`]
//! keeps everything in a map for tests and ephemeral runs.
//!
//! Atomicity is per `bulk_insert` call: a chunk is serialized into one
//! buffer and written with a single append, so a failed call leaves no
//! half-written chunk behind it in the happy path. Transactional semantics
//! across calls belong to the real database this trait stands in for.

use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};

/// Directory where response tables are stored (relative to current dir)
pub const DEFAULT_DATA_DIR: &str = ".surveyload/responses";

/// Bulk-write interface the import coordinator writes through.
pub trait ResponseStore: Send + Sync {
    /// Append a batch of converted records to a table. Returns the number
    /// of records written.
    fn bulk_insert(&self, table: &str, records: &[Value]) -> StoreResult<usize>;

    /// Remove every record of a table. Returns the number removed;
    /// deleting a table that does not exist removes zero.
    fn delete_table(&self, table: &str) -> StoreResult<usize>;

    /// Number of records currently stored for a table.
    fn count(&self, table: &str) -> StoreResult<usize>;
}

// =============================================================================
// JSONL store
// =============================================================================

/// File-backed store: one append-only `<table>.jsonl` file per table.
#[derive(Debug)]
pub struct JsonlStore {
    data_dir: PathBuf,
}

impl JsonlStore {
    /// Store under [`DEFAULT_DATA_DIR`].
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_DATA_DIR)
    }

    /// Store under a custom directory.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: PathBuf::from(dir.as_ref()),
        }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        // table names come from user input; keep them inside the data dir
        let safe: String = table
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.data_dir.join(format!("{safe}.jsonl"))
    }
}

impl Default for JsonlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseStore for JsonlStore {
    fn bulk_insert(&self, table: &str, records: &[Value]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        fs::create_dir_all(&self.data_dir)?;

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))?;
        file.write_all(buffer.as_bytes())?;

        Ok(records.len())
    }

    fn delete_table(&self, table: &str) -> StoreResult<usize> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(0);
        }
        let removed = self.count(table)?;
        fs::remove_file(path)?;
        Ok(removed)
    }

    fn count(&self, table: &str) -> StoreResult<usize> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut rows = 0;
        for line in reader.lines() {
            if !line?.is_empty() {
                rows += 1;
            }
        }
        Ok(rows)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Map-backed store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one table's records.
    pub fn records(&self, table: &str) -> Vec<Value> {
        self.read().get(table).cloned().unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Value>>> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Value>>> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ResponseStore for MemoryStore {
    fn bulk_insert(&self, table: &str, records: &[Value]) -> StoreResult<usize> {
        self.write()
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(records.len())
    }

    fn delete_table(&self, table: &str) -> StoreResult<usize> {
        Ok(self.write().remove(table).map_or(0, |rows| rows.len()))
    }

    fn count(&self, table: &str) -> StoreResult<usize> {
        Ok(self.read().get(table).map_or(0, |rows| rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jsonl_insert_count_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path());

        let records = vec![json!({ "Edad": 34.0 }), json!({ "Edad": null })];
        assert_eq!(store.bulk_insert("respuestas", &records).unwrap(), 2);
        assert_eq!(store.bulk_insert("respuestas", &records).unwrap(), 2);

        assert_eq!(store.count("respuestas").unwrap(), 4);
        assert_eq!(store.delete_table("respuestas").unwrap(), 4);
        assert_eq!(store.count("respuestas").unwrap(), 0);
    }

    #[test]
    fn test_jsonl_missing_table_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path());

        assert_eq!(store.count("nada").unwrap(), 0);
        assert_eq!(store.delete_table("nada").unwrap(), 0);
    }

    #[test]
    fn test_jsonl_sanitizes_table_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path());

        store.bulk_insert("../fuera", &[json!({"x": 1})]).unwrap();
        assert_eq!(store.count("../fuera").unwrap(), 1);
        // nothing escaped the data dir
        assert!(!dir.path().parent().unwrap().join("fuera.jsonl").exists());
    }

    #[test]
    fn test_jsonl_lines_are_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::with_dir(dir.path());
        store
            .bulk_insert("t", &[json!({ "a": "uno", "b": 2.0 })])
            .unwrap();

        let content = fs::read_to_string(dir.path().join("t.jsonl")).unwrap();
        let parsed: Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["a"], "uno");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.bulk_insert("t", &[json!({"x": 1})]).unwrap(), 1);
        assert_eq!(store.count("t").unwrap(), 1);
        assert_eq!(store.records("t")[0]["x"], 1);
        assert_eq!(store.delete_table("t").unwrap(), 1);
        assert_eq!(store.count("t").unwrap(), 0);
    }

    #[test]
    fn test_empty_insert_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.bulk_insert("t", &[]).unwrap(), 0);
    }
}
