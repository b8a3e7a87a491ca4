pub mod chunker;
pub mod ingest;
pub mod sqlite;
pub mod store;

pub use ingest::{IngestReport, Ingestor};
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkRecord, RetrievedChunk, VectorStore};
