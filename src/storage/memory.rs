use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{full_scan_search, Record, SearchHit, Storage};
use crate::error::Result;

/// Volatile in-memory backend: a mapping id→record, full-scan search.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<i64, Record>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, record: &Record) -> Result<()> {
        self.records.write().unwrap().insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        Ok(self.records.read().unwrap().get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let records: Vec<Record> = self.records.read().unwrap().values().cloned().collect();
        Ok(full_scan_search(&records, query_vec, k))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.records.write().unwrap().remove(&id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
