//! The storage capability: persists descriptor records and answers top-k
//! vector search. Four implementations live in sibling modules; all of them
//! go through this one trait so the detector never knows which it has.

mod memory;
mod postgres;
mod snapshot;
mod sqlite;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use snapshot::{SnapshotDocument, SnapshotStorage};
pub use sqlite::SqliteStorage;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A persisted descriptor: metadata plus both embeddings and a creation
/// timestamp. Identifier is the primary key; `save` upserts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub files: Vec<String>,
    pub text_embedding: Vec<f32>,
    pub diff_embedding: Vec<f32>,
    pub created_at: i64,
}

/// A single duplicate-check result, for storage backends that opt into
/// `save_check`/`get_analytics`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckRecord {
    pub id: i64,
    pub result_type: String,
    pub original_id: Option<i64>,
    pub confidence: f32,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Analytics {
    pub summary: AnalyticsSummary,
    pub timeline: Vec<CheckRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsSummary {
    pub total_checks: u64,
    pub duplicates: u64,
    pub possibles: u64,
    pub uniques: u64,
}

/// A single scored hit from `search`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: i64,
    pub score: f32,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, record: &Record) -> Result<()>;
    async fn get(&self, id: i64) -> Result<Option<Record>>;
    async fn get_all(&self) -> Result<Vec<Record>>;
    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn close(&self) -> Result<()>;

    /// No-op by default; backends that persist check outcomes override this.
    async fn save_check(&self, _result: &CheckRecord) -> Result<()> {
        Ok(())
    }

    /// `None` by default; only backends that implement `save_check`
    /// meaningfully also implement this.
    async fn get_analytics(&self) -> Result<Option<Analytics>> {
        Ok(None)
    }

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn save(&self, record: &Record) -> Result<()> {
        (**self).save(record).await
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        (**self).get(id).await
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        (**self).get_all().await
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        (**self).search(query_vec, k).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        (**self).delete(id).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }

    async fn save_check(&self, result: &CheckRecord) -> Result<()> {
        (**self).save_check(result).await
    }

    async fn get_analytics(&self) -> Result<Option<Analytics>> {
        (**self).get_analytics().await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

/// Shared full-scan implementation of `search`, used by any backend that has
/// no native vector index (the in-memory and sqlite backends) and as the
/// degraded-mode fallback when a native backend's index is unavailable.
pub(crate) fn full_scan_search(records: &[Record], query_vec: &[f32], k: usize) -> Vec<SearchHit> {
    let mut scored: Vec<SearchHit> = records
        .iter()
        .map(|r| SearchHit {
            id: r.id,
            score: crate::vector_math::cosine(query_vec, &r.text_embedding),
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id)));
    scored.truncate(k);
    scored
}
