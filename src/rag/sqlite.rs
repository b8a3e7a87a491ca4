//! SQLite-backed vector store.
//!
//! Embeddings are stored as little-endian f32 blobs and searched by
//! brute-force cosine similarity. Table names come from bot profiles and are
//! validated before being interpolated into SQL.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::store::{ChunkRecord, RetrievedChunk, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

/// Table names are interpolated into SQL, so anything outside
/// `[A-Za-z_][A-Za-z0-9_]*` is rejected.
pub fn validate_table_name(table: &str) -> Result<(), ApiError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = table
        .chars()
        .skip(1)
        .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "invalid vector table name: {table:?}"
        )))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_table(&self, table: &str) -> Result<(), ApiError> {
        validate_table_name(table)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                file_name TEXT NOT NULL DEFAULT '',
                file_hash TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{{}}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_hash ON {table}(file_hash)"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(
        &self,
        table: &str,
        record: ChunkRecord,
        embedding: Vec<f32>,
    ) -> Result<(), ApiError> {
        validate_table_name(table)?;
        let blob = Self::serialize_embedding(&embedding);
        let metadata = record
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default())
            .unwrap_or_else(|| "{}".to_string());

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {table}
                (chunk_id, content, source, file_name, file_hash, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ))
        .bind(&record.chunk_id)
        .bind(&record.content)
        .bind(&record.source)
        .bind(&record.file_name)
        .bind(&record.file_hash)
        .bind(&metadata)
        .bind(&blob)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search(
        &self,
        table: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        validate_table_name(table)?;
        let rows = sqlx::query(&format!(
            "SELECT content, metadata, embedding FROM {table}"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .filter_map(|row| {
                let blob: Option<Vec<u8>> = row.get("embedding");
                let stored = Self::deserialize_embedding(&blob?);
                let similarity = Self::cosine_similarity(embedding, &stored);
                let metadata: String = row.get("metadata");

                Some(RetrievedChunk {
                    content: row.get("content"),
                    distance: 1.0 - similarity,
                    metadata: serde_json::from_str::<Value>(&metadata).ok(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn contains_file_hash(&self, table: &str, file_hash: &str) -> Result<bool, ApiError> {
        validate_table_name(table)?;
        let row = sqlx::query(&format!(
            "SELECT 1 AS present FROM {table} WHERE file_hash = ?1 LIMIT 1"
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn delete_by_file_hash(&self, table: &str, file_hash: &str) -> Result<u64, ApiError> {
        validate_table_name(table)?;
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE file_hash = ?1"))
            .bind(file_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_file_name(&self, table: &str, file_name: &str) -> Result<u64, ApiError> {
        validate_table_name(table)?;
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE file_name = ?1"))
            .bind(file_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self, table: &str) -> Result<u64, ApiError> {
        validate_table_name(table)?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total") as u64)
    }

    async fn drop_table(&self, table: &str) -> Result<(), ApiError> {
        validate_table_name(table)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
