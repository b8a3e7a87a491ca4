use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::bots::{BotDirectory, BotStore};
use crate::chat::{AnswerComposer, ChatOrchestrator};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::{LlmProvider, OllamaProvider};
use crate::rag::{Ingestor, SqliteVectorStore, VectorStore};
use crate::tools::registry::{SqliteToolRegistry, ToolRegistry};
use crate::tools::{ToolDetector, ToolExecutor};

/// Shared application state, assembled once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub bots: Arc<BotStore>,
    pub registry: Arc<dyn ToolRegistry>,
    pub vectors: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LlmProvider>,
    pub composer: AnswerComposer,
    pub orchestrator: ChatOrchestrator,
    pub ingestor: Ingestor,
}

impl AppState {
    pub async fn initialize(config: AppConfig) -> Result<Arc<Self>, ApiError> {
        std::fs::create_dir_all(&config.storage.data_dir).map_err(ApiError::internal)?;

        let options = SqliteConnectOptions::new()
            .filename(config.storage.db_path())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let bots = Arc::new(BotStore::new(pool.clone()).await?);
        let registry: Arc<dyn ToolRegistry> =
            Arc::new(SqliteToolRegistry::new(pool.clone()).await?);
        let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(pool.clone()));
        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(&config.ollama)?);

        let detector = ToolDetector::new(
            registry.clone(),
            llm.clone(),
            config.models.tool_model.clone(),
        );
        let executor = ToolExecutor::new(
            registry.clone(),
            Duration::from_secs(config.tools.call_timeout_secs),
        )?;
        let composer = AnswerComposer::new(llm.clone());

        let orchestrator = ChatOrchestrator::new(
            bots.clone() as Arc<dyn BotDirectory>,
            detector,
            executor,
            AnswerComposer::new(llm.clone()),
            vectors.clone(),
            llm.clone(),
            config.models.clone(),
            config.retrieval.clone(),
        );

        let ingestor = Ingestor::new(vectors.clone(), llm.clone(), config.ingest.clone());

        Ok(Arc::new(AppState {
            config,
            pool,
            bots,
            registry,
            vectors,
            llm,
            composer,
            orchestrator,
            ingestor,
        }))
    }
}
