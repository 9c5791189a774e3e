//! File-snapshot backend: serializes the detector's exported state (records
//! + bloom export) as a single JSON document. Optional and bypasses the
//! per-record `save`/`get`/`search` contract — it is only used by callers
//! that explicitly invoke `save_to_file`/`load_from_file`.
//!
//! Mirrors the flat-file load/save shape this codebase already uses for its
//! own on-disk vector index.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Record, SearchHit, Storage};
use crate::error::{DetectorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub records: Vec<Record>,
    pub bloom: String,
}

/// Thin wrapper so a snapshot document can also be handed to code that
/// expects a `Storage` (e.g. to back `search`/`get` ad hoc after a restore).
/// `save`/`delete`/`save_check` are intentionally unsupported: this backend
/// bypasses the per-record interface and is only ever written to as a whole
/// document via `save_to_file`.
pub struct SnapshotStorage {
    records: std::sync::RwLock<Vec<Record>>,
}

impl SnapshotStorage {
    pub fn from_document(doc: SnapshotDocument) -> Self {
        Self {
            records: std::sync::RwLock::new(doc.records),
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<SnapshotDocument> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::Storage(crate::error::StorageError::Io(e.to_string())))?;
        serde_json::from_str(&data)
            .map_err(|e| DetectorError::Storage(crate::error::StorageError::Io(format!("bad snapshot json: {e}"))))
    }

    pub fn save_to_file(doc: &SnapshotDocument, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(doc)
            .map_err(|e| DetectorError::Storage(crate::error::StorageError::Io(e.to_string())))?;
        std::fs::write(path, data)
            .map_err(|e| DetectorError::Storage(crate::error::StorageError::Io(e.to_string())))
    }
}

#[async_trait]
impl Storage for SnapshotStorage {
    async fn save(&self, _record: &Record) -> Result<()> {
        Err(DetectorError::Storage(crate::error::StorageError::Unsupported))
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        Ok(self.records.read().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().unwrap().clone())
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let records = self.records.read().unwrap().clone();
        Ok(super::full_scan_search(&records, query_vec, k))
    }

    async fn delete(&self, _id: i64) -> Result<()> {
        Err(DetectorError::Storage(crate::error::StorageError::Unsupported))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "snapshot-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_doc() -> SnapshotDocument {
        SnapshotDocument {
            records: vec![Record {
                id: 1,
                title: "t".into(),
                description: "d".into(),
                files: vec!["a.rs".into()],
                text_embedding: vec![1.0, 0.0],
                diff_embedding: vec![0.0, 1.0],
                created_at: 1000,
            }],
            bloom: "AAAA".into(),
        }
    }

    #[test]
    fn round_trips_through_a_file() {
        let doc = sample_doc();
        let tmp = NamedTempFile::new().unwrap();
        SnapshotStorage::save_to_file(&doc, tmp.path()).unwrap();
        let loaded = SnapshotStorage::load_from_file(tmp.path()).unwrap();
        assert_eq!(loaded.records, doc.records);
        assert_eq!(loaded.bloom, doc.bloom);
    }

    #[tokio::test]
    async fn save_and_delete_are_unsupported() {
        let storage = SnapshotStorage::from_document(sample_doc());
        let record = sample_doc().records.remove(0);
        assert!(storage.save(&record).await.is_err());
        assert!(storage.delete(1).await.is_err());
    }

    #[tokio::test]
    async fn get_reads_from_the_loaded_document() {
        let storage = SnapshotStorage::from_document(sample_doc());
        assert!(storage.get(1).await.unwrap().is_some());
        assert!(storage.get(999).await.unwrap().is_none());
    }
}
