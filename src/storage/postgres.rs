//! Client/server relational backend with a native `vector` column
//! (pgvector). Search delegates to the ANN index via the `<=>` cosine
//! distance operator; degrades to a full scan when the extension (or its
//! index) is unavailable.

use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;

use super::{full_scan_search, Analytics, AnalyticsSummary, CheckRecord, Record, SearchHit, Storage};
use crate::error::{DetectorError, Result, StorageError};

const MAX_CONNECT_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

fn storage_err(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::Storage(StorageError::Io(e.to_string()))
}

/// Pooled async Postgres/pgvector store. The connection pool is owned here,
/// not by the detector — its open/close lifecycle is this adapter's
/// responsibility, not a shared global.
pub struct PostgresStorage {
    pool: Pool<Postgres>,
    dimensions: usize,
}

impl PostgresStorage {
    /// Connects with bounded exponential backoff; the final failure surfaces
    /// as a `storage_error` rather than retrying forever.
    pub async fn connect(database_url: &str, dimensions: usize) -> Result<Self> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match PgPoolOptions::new().max_connections(10).connect(database_url).await {
                Ok(pool) => {
                    let store = Self { pool, dimensions };
                    store.ensure_schema().await?;
                    return Ok(store);
                }
                Err(e) if attempt < MAX_CONNECT_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(attempt, error = %e, "postgres connect failed, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(storage_err(format!("connect failed after {attempt} attempts: {e}"))),
            }
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        // `CREATE EXTENSION` can fail on installs without pgvector available;
        // degrade the index creation to a no-op rather than failing the
        // whole connect.
        if sqlx::query("CREATE EXTENSION IF NOT EXISTS vector").execute(&self.pool).await.is_err() {
            warn!("pgvector extension unavailable; ANN index creation will be skipped");
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS records (
                id BIGINT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                files JSONB NOT NULL,
                text_embedding vector({dim}),
                diff_embedding vector({dim}),
                created_at BIGINT NOT NULL
            )",
            dim = self.dimensions
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS check_results (
                auto_id BIGSERIAL PRIMARY KEY,
                id BIGINT NOT NULL,
                result_type TEXT NOT NULL,
                original_id BIGINT,
                confidence REAL NOT NULL,
                timestamp_ms BIGINT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_created_at ON records (created_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        // Best-effort: an ANN index needs the extension above to have
        // succeeded. A failure here leaves `search` correct but slow (full
        // index scan inside Postgres), never incorrect.
        let _ = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_text_embedding
             ON records USING ivfflat (text_embedding vector_cosine_ops)",
        )
        .execute(&self.pool)
        .await;

        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<Record> {
        let files_json: serde_json::Value = row.try_get("files").map_err(storage_err)?;
        let files: Vec<String> = serde_json::from_value(files_json).map_err(storage_err)?;
        let text: Vector = row.try_get("text_embedding").map_err(storage_err)?;
        let diff: Vector = row.try_get("diff_embedding").map_err(storage_err)?;
        Ok(Record {
            id: row.try_get("id").map_err(storage_err)?,
            title: row.try_get("title").map_err(storage_err)?,
            description: row.try_get("description").map_err(storage_err)?,
            files,
            text_embedding: text.to_vec(),
            diff_embedding: diff.to_vec(),
            created_at: row.try_get("created_at").map_err(storage_err)?,
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn save(&self, record: &Record) -> Result<()> {
        if record.text_embedding.len() != self.dimensions || record.diff_embedding.len() != self.dimensions {
            return Err(DetectorError::Storage(StorageError::DimensionMismatch {
                expected: self.dimensions,
                actual: record.text_embedding.len().max(record.diff_embedding.len()),
            }));
        }
        let files_json = serde_json::to_value(&record.files).map_err(storage_err)?;
        sqlx::query(
            "INSERT INTO records (id, title, description, files, text_embedding, diff_embedding, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
               title = EXCLUDED.title,
               description = EXCLUDED.description,
               files = EXCLUDED.files,
               text_embedding = EXCLUDED.text_embedding,
               diff_embedding = EXCLUDED.diff_embedding,
               created_at = EXCLUDED.created_at",
        )
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(files_json)
        .bind(Vector::from(record.text_embedding.clone()))
        .bind(Vector::from(record.diff_embedding.clone()))
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        let row = sqlx::query("SELECT * FROM records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query("SELECT * FROM records ORDER BY created_at DESC LIMIT 10000")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(Self::row_to_record).collect()
    }

    /// `ORDER BY text_embedding <=> :q LIMIT :k`, delegating to the ANN index
    /// when present. If the query itself fails (e.g. extension genuinely
    /// absent and the operator is unknown), falls back to an in-process full
    /// scan so the result is still correct, just slower.
    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let query = Vector::from(query_vec.to_vec());
        let rows = sqlx::query(
            "SELECT id, 1 - (text_embedding <=> $1) AS score FROM records
             ORDER BY text_embedding <=> $1 LIMIT $2",
        )
        .bind(query)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => {
                let mut hits = Vec::with_capacity(rows.len());
                for row in rows {
                    hits.push(SearchHit {
                        id: row.try_get("id").map_err(storage_err)?,
                        score: row.try_get("score").map_err(storage_err)?,
                    });
                }
                Ok(hits)
            }
            Err(e) => {
                warn!(error = %e, "pgvector search failed, falling back to full scan");
                let records = self.get_all().await?;
                Ok(full_scan_search(&records, query_vec, k))
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn save_check(&self, result: &CheckRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO check_results (id, result_type, original_id, confidence, timestamp_ms)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(result.id)
        .bind(&result.result_type)
        .bind(result.original_id)
        .bind(result.confidence)
        .bind(result.timestamp_ms)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get_analytics(&self) -> Result<Option<Analytics>> {
        let rows = sqlx::query(
            "SELECT id, result_type, original_id, confidence, timestamp_ms
             FROM check_results ORDER BY timestamp_ms DESC LIMIT 10000",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut summary = AnalyticsSummary::default();
        let mut timeline = Vec::with_capacity(rows.len());
        for row in rows {
            let result_type: String = row.try_get("result_type").map_err(storage_err)?;
            summary.total_checks += 1;
            match result_type.as_str() {
                "duplicate" => summary.duplicates += 1,
                "possible" => summary.possibles += 1,
                _ => summary.uniques += 1,
            }
            timeline.push(CheckRecord {
                id: row.try_get("id").map_err(storage_err)?,
                result_type,
                original_id: row.try_get("original_id").map_err(storage_err)?,
                confidence: row.try_get("confidence").map_err(storage_err)?,
                timestamp_ms: row.try_get("timestamp_ms").map_err(storage_err)?,
            });
        }
        Ok(Some(Analytics { summary, timeline }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres-pgvector"
    }
}
