//! Embedded single-file relational backend. One table for records, one for
//! check results; embeddings are stored as native-endian `f32` BLOBs the way
//! this ecosystem's own embedding caches already encode vectors.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{full_scan_search, Analytics, AnalyticsSummary, CheckRecord, Record, SearchHit, Storage};
use crate::error::{DetectorError, Result, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    files TEXT NOT NULL,
    text_embedding BLOB NOT NULL,
    diff_embedding BLOB NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_created_at ON records (created_at DESC);
CREATE TABLE IF NOT EXISTS check_results (
    auto_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id INTEGER NOT NULL,
    result_type TEXT NOT NULL,
    original_id INTEGER,
    confidence REAL NOT NULL,
    timestamp_ms INTEGER NOT NULL
);
";

fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for x in v {
        bytes.extend_from_slice(&x.to_ne_bytes());
    }
    bytes
}

/// Decodes a native-endian `f32` BLOB. Trailing bytes that don't form a
/// complete `f32` are silently dropped by `chunks_exact`, matching this
/// ecosystem's existing BLOB-vector decode convention.
fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn io_err(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::Storage(StorageError::Io(e.to_string()))
}

/// Single-file SQLite-backed store. `rusqlite`'s `bundled` feature vendors
/// its own SQLite, so this adapter has no system dependency.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(io_err)?;
        conn.execute_batch(SCHEMA).map_err(io_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(io_err)?;
        conn.execute_batch(SCHEMA).map_err(io_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn row_to_record(
        id: i64,
        title: String,
        description: String,
        files_json: String,
        text_blob: Vec<u8>,
        diff_blob: Vec<u8>,
        created_at: i64,
    ) -> Result<Record> {
        let files: Vec<String> = serde_json::from_str(&files_json).map_err(io_err)?;
        Ok(Record {
            id,
            title,
            description,
            files,
            text_embedding: decode_vector(&text_blob),
            diff_embedding: decode_vector(&diff_blob),
            created_at,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save(&self, record: &Record) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let files_json = serde_json::to_string(&record.files).map_err(io_err)?;
        conn.execute(
            "INSERT INTO records (id, title, description, files, text_embedding, diff_embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               description = excluded.description,
               files = excluded.files,
               text_embedding = excluded.text_embedding,
               diff_embedding = excluded.diff_embedding,
               created_at = excluded.created_at",
            params![
                record.id,
                record.title,
                record.description,
                files_json,
                encode_vector(&record.text_embedding),
                encode_vector(&record.diff_embedding),
                record.created_at,
            ],
        )
        .map_err(io_err)?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, title, description, files, text_embedding, diff_embedding, created_at
                 FROM records WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(io_err)?;
        match row {
            Some((id, title, description, files, text, diff, created_at)) => {
                Ok(Some(Self::row_to_record(id, title, description, files, text, diff, created_at)?))
            }
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, description, files, text_embedding, diff_embedding, created_at
                 FROM records ORDER BY created_at DESC LIMIT 10000",
            )
            .map_err(io_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .map_err(io_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (id, title, description, files, text, diff, created_at) = row.map_err(io_err)?;
            out.push(Self::row_to_record(id, title, description, files, text, diff, created_at)?);
        }
        Ok(out)
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        // No vector index in SQLite: cosine is computed in-process over a
        // full scan.
        let records = self.get_all().await?;
        Ok(full_scan_search(&records, query_vec, k))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM records WHERE id = ?1", params![id]).map_err(io_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn save_check(&self, result: &CheckRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO check_results (id, result_type, original_id, confidence, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![result.id, result.result_type, result.original_id, result.confidence, result.timestamp_ms],
        )
        .map_err(io_err)?;
        Ok(())
    }

    async fn get_analytics(&self) -> Result<Option<Analytics>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, result_type, original_id, confidence, timestamp_ms FROM check_results ORDER BY timestamp_ms DESC LIMIT 10000")
            .map_err(io_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CheckRecord {
                    id: row.get(0)?,
                    result_type: row.get(1)?,
                    original_id: row.get(2)?,
                    confidence: row.get(3)?,
                    timestamp_ms: row.get(4)?,
                })
            })
            .map_err(io_err)?;
        let mut timeline = Vec::new();
        let mut summary = AnalyticsSummary::default();
        for row in rows {
            let record = row.map_err(io_err)?;
            summary.total_checks += 1;
            match record.result_type.as_str() {
                "duplicate" => summary.duplicates += 1,
                "possible" => summary.possibles += 1,
                _ => summary.uniques += 1,
            }
            timeline.push(record);
        }
        Ok(Some(Analytics { summary, timeline }))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64, vec: Vec<f32>) -> Record {
        Record {
            id,
            title: format!("title-{id}"),
            description: "desc".into(),
            files: vec!["a.rs".into(), "b.rs".into()],
            text_embedding: vec.clone(),
            diff_embedding: vec,
            created_at: 1000 + id,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips_embeddings() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let record = sample(1, vec![0.1, 0.2, 0.3]);
        store.save(&record).await.unwrap();
        let fetched = store.get(1).await.unwrap().unwrap();
        assert_eq!(fetched.text_embedding, record.text_embedding);
        assert_eq!(fetched.files, record.files);
    }

    #[tokio::test]
    async fn save_upserts_by_id() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.save(&sample(1, vec![1.0])).await.unwrap();
        let mut updated = sample(1, vec![2.0]);
        updated.title = "changed".into();
        store.save(&updated).await.unwrap();

        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert_eq!(store.get(1).await.unwrap().unwrap().title, "changed");
    }

    #[tokio::test]
    async fn search_full_scans_and_orders_descending() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.save(&sample(1, vec![1.0, 0.0])).await.unwrap();
        store.save(&sample(2, vec![0.0, 1.0])).await.unwrap();
        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, 1);
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.save(&sample(1, vec![1.0])).await.unwrap();
        store.delete(1).await.unwrap();
        assert!(store.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analytics_tallies_result_types() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .save_check(&CheckRecord {
                id: 2,
                result_type: "duplicate".into(),
                original_id: Some(1),
                confidence: 0.95,
                timestamp_ms: 42,
            })
            .await
            .unwrap();
        let analytics = store.get_analytics().await.unwrap().unwrap();
        assert_eq!(analytics.summary.duplicates, 1);
        assert_eq!(analytics.timeline.len(), 1);
    }
}
