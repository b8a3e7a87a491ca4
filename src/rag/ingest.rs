//! Knowledge ingestion: chunk, embed and index a document.
//!
//! Embedding calls run in fixed-size batches with bounded fan-out; a batch
//! completes before the next one starts, so the embedding backend never sees
//! more than `batch_size` concurrent requests. Each chunk retries with
//! exponential backoff, and the report carries per-item results rather than
//! counters.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::chunker::split_into_chunks;
use super::store::{ChunkRecord, VectorStore};
use crate::core::config::IngestConfig;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub file_hash: String,
    pub total_chunks: usize,
    /// Indices of chunks that were embedded and stored.
    pub stored: Vec<usize>,
    pub failed: Vec<ChunkFailure>,
    /// The document was already present; nothing was ingested.
    pub deduplicated: bool,
    /// Partial failure: stored chunks were removed again.
    pub rolled_back: bool,
}

impl IngestReport {
    pub fn succeeded(&self) -> bool {
        self.deduplicated || (self.failed.is_empty() && !self.rolled_back)
    }
}

pub struct Ingestor {
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmProvider>,
        config: IngestConfig,
    ) -> Self {
        Self {
            vectors,
            llm,
            config,
        }
    }

    /// Ingest one document into the given vector table.
    ///
    /// Documents are deduplicated by content hash. On partial failure every
    /// stored chunk of the document is rolled back so the index never holds
    /// half a document.
    pub async fn ingest_text(
        &self,
        table: &str,
        embed_model: &str,
        text: &str,
        file_name: &str,
        source: &str,
    ) -> Result<IngestReport, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::BadRequest("document text is empty".to_string()));
        }

        let file_hash = hex::encode(Sha256::digest(text.as_bytes()));
        self.vectors.ensure_table(table).await?;

        if self.vectors.contains_file_hash(table, &file_hash).await? {
            return Ok(IngestReport {
                file_hash,
                total_chunks: 0,
                stored: Vec::new(),
                failed: Vec::new(),
                deduplicated: true,
                rolled_back: false,
            });
        }

        let chunks = split_into_chunks(text, self.config.chunk_size, self.config.chunk_overlap);
        let total_chunks = chunks.len();
        let timestamp = chrono::Utc::now().to_rfc3339();

        let mut stored = Vec::new();
        let mut failed = Vec::new();

        for (batch_start, batch) in chunks
            .chunks(self.config.batch_size.max(1))
            .enumerate()
            .map(|(n, batch)| (n * self.config.batch_size.max(1), batch))
        {
            let futures = batch.iter().enumerate().map(|(offset, chunk)| {
                let index = batch_start + offset;
                self.store_chunk(
                    table,
                    embed_model,
                    chunk,
                    index,
                    total_chunks,
                    file_name,
                    &file_hash,
                    source,
                    &timestamp,
                )
            });

            for (offset, result) in join_all(futures).await.into_iter().enumerate() {
                let index = batch_start + offset;
                match result {
                    Ok(()) => stored.push(index),
                    Err(err) => {
                        tracing::error!(index, file_name, "Failed to process chunk: {err}");
                        failed.push(ChunkFailure {
                            index,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        let rolled_back = if failed.is_empty() {
            false
        } else {
            self.vectors.delete_by_file_hash(table, &file_hash).await?;
            true
        };

        Ok(IngestReport {
            file_hash,
            total_chunks,
            stored,
            failed,
            deduplicated: false,
            rolled_back,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_chunk(
        &self,
        table: &str,
        embed_model: &str,
        chunk: &str,
        index: usize,
        total_chunks: usize,
        file_name: &str,
        file_hash: &str,
        source: &str,
        timestamp: &str,
    ) -> Result<(), ApiError> {
        let mut last_err = None;

        for attempt in 1..=self.config.max_attempts {
            match self.try_store_chunk(
                table,
                embed_model,
                chunk,
                index,
                total_chunks,
                file_name,
                file_hash,
                source,
                timestamp,
            )
            .await
            {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(index, "Chunk stored after {attempt} attempts");
                    }
                    return Ok(());
                }
                Err(err) => {
                    last_err = Some(err);
                    if attempt < self.config.max_attempts {
                        let delay = Duration::from_millis(
                            self.config.backoff_base_ms.saturating_mul(1 << attempt),
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ApiError::Internal("chunk storage failed".to_string())))
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_store_chunk(
        &self,
        table: &str,
        embed_model: &str,
        chunk: &str,
        index: usize,
        total_chunks: usize,
        file_name: &str,
        file_hash: &str,
        source: &str,
        timestamp: &str,
    ) -> Result<(), ApiError> {
        let embedding = self.llm.embed(chunk, embed_model).await?;
        let record = ChunkRecord {
            chunk_id: Uuid::new_v4().to_string(),
            content: chunk.to_string(),
            source: source.to_string(),
            file_name: file_name.to_string(),
            file_hash: file_hash.to_string(),
            metadata: Some(json!({
                "source": source,
                "timestamp": timestamp,
                "chunkIndex": index,
                "totalChunks": total_chunks,
                "fileName": file_name,
                "fileHash": file_hash,
            })),
        };
        self.vectors.insert(table, record, embedding).await
    }
}

#[cfg(test)]
mod tests {
    use sqlx::SqlitePool;

    use super::*;
    use crate::llm::testing::MockLlm;
    use crate::rag::sqlite::SqliteVectorStore;

    async fn temp_vectors() -> (Arc<SqliteVectorStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(dir.path().join("vectors.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.expect("pool");
        (Arc::new(SqliteVectorStore::new(pool)), dir)
    }

    fn fast_config() -> IngestConfig {
        IngestConfig {
            chunk_size: 40,
            chunk_overlap: 5,
            batch_size: 3,
            max_attempts: 2,
            backoff_base_ms: 0,
        }
    }

    #[tokio::test]
    async fn ingests_all_chunks_and_reports_indices() {
        let (vectors, _dir) = temp_vectors().await;
        let llm = Arc::new(MockLlm::new());
        let ingestor = Ingestor::new(vectors.clone(), llm, fast_config());

        let text = "The quick brown fox. ".repeat(10);
        let report = ingestor
            .ingest_text("kb_test", "embed-model", &text, "fox.txt", "uploads/fox.txt")
            .await
            .expect("ingest");

        assert!(report.succeeded());
        assert!(!report.deduplicated);
        assert_eq!(report.stored.len(), report.total_chunks);
        assert!(report.failed.is_empty());
        assert_eq!(
            vectors.count("kb_test").await.expect("count"),
            report.total_chunks as u64
        );
    }

    #[tokio::test]
    async fn reingesting_same_text_is_deduplicated() {
        let (vectors, _dir) = temp_vectors().await;
        let llm = Arc::new(MockLlm::new());
        let ingestor = Ingestor::new(vectors, llm.clone(), fast_config());

        let text = "Some document body with enough words to chunk.";
        ingestor
            .ingest_text("kb_test", "m", text, "doc.txt", "uploads/doc.txt")
            .await
            .expect("first ingest");
        let embeds_after_first = llm.embed_calls.load(std::sync::atomic::Ordering::SeqCst);

        let report = ingestor
            .ingest_text("kb_test", "m", text, "doc.txt", "uploads/doc.txt")
            .await
            .expect("second ingest");

        assert!(report.deduplicated);
        assert_eq!(
            llm.embed_calls.load(std::sync::atomic::Ordering::SeqCst),
            embeds_after_first
        );
    }

    #[tokio::test]
    async fn partial_failure_reports_failed_items_and_rolls_back() {
        let (vectors, _dir) = temp_vectors().await;
        // Every chunk containing the marker fails all attempts.
        let llm = Arc::new(MockLlm::new().fail_embeds_containing("POISON"));
        let ingestor = Ingestor::new(vectors.clone(), llm, fast_config());

        let text = format!("{} POISONPOISONPOISONPOISON {}", "good ".repeat(12), "fine ".repeat(12));
        let report = ingestor
            .ingest_text("kb_test", "m", &text, "mix.txt", "uploads/mix.txt")
            .await
            .expect("ingest");

        assert!(!report.succeeded());
        assert!(report.rolled_back);
        assert!(!report.failed.is_empty());
        assert!(report.failed.iter().all(|f| f.error.contains("embedding")));
        // Rollback removed the chunks that had been stored.
        assert_eq!(vectors.count("kb_test").await.expect("count"), 0);
    }

    #[tokio::test]
    async fn transient_embed_failure_is_retried() {
        let (vectors, _dir) = temp_vectors().await;
        let llm = Arc::new(MockLlm::new().fail_embeds(1));
        let mut config = fast_config();
        config.chunk_size = 400;
        config.batch_size = 1;
        let ingestor = Ingestor::new(vectors, llm.clone(), config);

        let report = ingestor
            .ingest_text("kb_test", "m", "One short document.", "a.txt", "uploads/a.txt")
            .await
            .expect("ingest");

        assert!(report.succeeded());
        assert_eq!(report.stored, vec![0]);
        assert_eq!(llm.embed_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_document_rejected() {
        let (vectors, _dir) = temp_vectors().await;
        let llm = Arc::new(MockLlm::new());
        let ingestor = Ingestor::new(vectors, llm, fast_config());

        assert!(matches!(
            ingestor
                .ingest_text("kb_test", "m", "   ", "x.txt", "uploads/x.txt")
                .await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
