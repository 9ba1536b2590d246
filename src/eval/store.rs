//! Durable, resumable store of scored records.
//!
//! The whole store is one JSON object keyed by item id. Every flush rewrites
//! the complete file through a temporary sibling that is renamed over the
//! target, so a crash leaves either the previous or the new file intact.

use super::record::ScoredRecord;
use crate::error::{EvalError, Result};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Scored records by item id. Sorted, so equal contents serialize identically.
pub type Records = BTreeMap<String, ScoredRecord>;

/// Load a store file. A missing file is an empty store.
///
/// A file that exists but does not hold a JSON object of records is
/// reported as [`EvalError::CorruptStore`], never treated as empty.
pub fn load_records(path: &Path) -> Result<Records> {
    if !path.exists() {
        return Ok(Records::new());
    }

    let data = fs::read(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_slice(&data).map_err(|e| EvalError::CorruptStore {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write `data` to `path` atomically (temp file in the same directory, then rename).
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
    }

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| EvalError::io(parent, e))?;
    tmp.write_all(data).map_err(|e| EvalError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| EvalError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| EvalError::io(path, e.error))?;

    Ok(())
}

/// In-memory view of the store file plus the path it is flushed to.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    records: Records,
}

impl ResultStore {
    /// Open the store at `path`, loading whatever a previous run persisted.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path)?;
        debug!(path = %path.display(), records = records.len(), "loaded result store");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&ScoredRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids whose record already carries a judge verdict.
    pub fn judged_ids(&self) -> HashSet<String> {
        self.records
            .iter()
            .filter(|(_, record)| record.has_judge_score())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Merge `updates` (whole-record replacement) and rewrite the file.
    pub fn upsert_and_flush(&mut self, updates: Records) -> Result<()> {
        self.records.extend(updates);
        self.flush()
    }

    /// Rewrite the whole file from memory.
    pub fn flush(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        write_atomic(&self.path, &data)?;
        debug!(path = %self.path.display(), records = self.records.len(), "flushed result store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::metrics::MetricScores;
    use crate::eval::testing::item;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn record(id: &str, judge: Option<u8>) -> ScoredRecord {
        ScoredRecord::new(
            &item(id, "Paris", "Paris", 1),
            MetricScores {
                similarity_score: 1.0,
                overlap_f1: 1.0,
            },
            judge,
        )
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::load(dir.path().join("results.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_then_load_reflects_updates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.json");

        let mut store = ResultStore::load(&path).unwrap();
        store
            .upsert_and_flush(Records::from([
                ("0".to_string(), record("0", Some(1))),
                ("1".to_string(), record("1", None)),
            ]))
            .unwrap();
        store
            .upsert_and_flush(Records::from([("1".to_string(), record("1", Some(0)))]))
            .unwrap();

        let reloaded = ResultStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("1").unwrap().judge_score, json!(0));
        assert_eq!(reloaded.records(), store.records());
    }

    #[test]
    fn test_judged_ids_exclude_null_verdicts() {
        let dir = TempDir::new().unwrap();
        let mut store = ResultStore::load(dir.path().join("r.json")).unwrap();
        store
            .upsert_and_flush(Records::from([
                ("a".to_string(), record("a", Some(1))),
                ("b".to_string(), record("b", None)),
            ]))
            .unwrap();

        let ids = store.judged_ids();
        assert!(ids.contains("a"));
        assert!(!ids.contains("b"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        fs::write(&path, "{\"0\": {\"question\": ").unwrap();

        match ResultStore::load(&path) {
            Err(EvalError::CorruptStore { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CorruptStore, got {:?}", other),
        }

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(EvalError::CorruptStore { .. })
        ));
    }

    #[test]
    fn test_flush_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let mut store = ResultStore::load(&path).unwrap();
        store
            .upsert_and_flush(Records::from([("0".to_string(), record("0", Some(1)))]))
            .unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["0"]["judge_score"], 1);
    }
}
