//! Abstract interface for the similarity-search backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// A chunk to be embedded and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub content: String,
    /// Source identifier (upload path, URL, ...).
    pub source: String,
    pub file_name: String,
    /// Content hash of the whole source document; dedup and rollback key.
    pub file_hash: String,
    pub metadata: Option<Value>,
}

/// A chunk returned by similarity search. Lower distance = closer match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub distance: f32,
    pub metadata: Option<Value>,
}

/// Abstract similarity-search backend. Each bot owns one named table.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the table if it does not exist. Fails on an invalid name.
    async fn ensure_table(&self, table: &str) -> Result<(), ApiError>;

    async fn insert(
        &self,
        table: &str,
        record: ChunkRecord,
        embedding: Vec<f32>,
    ) -> Result<(), ApiError>;

    /// Top `limit` chunks by cosine distance, ascending.
    async fn search(
        &self,
        table: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError>;

    async fn contains_file_hash(&self, table: &str, file_hash: &str) -> Result<bool, ApiError>;

    /// Rollback/replace helper: drop every chunk of one source document.
    async fn delete_by_file_hash(&self, table: &str, file_hash: &str) -> Result<u64, ApiError>;

    async fn delete_by_file_name(&self, table: &str, file_name: &str) -> Result<u64, ApiError>;

    async fn count(&self, table: &str) -> Result<u64, ApiError>;

    /// Remove the whole table; used when its owning bot is deleted.
    async fn drop_table(&self, table: &str) -> Result<(), ApiError>;
}
