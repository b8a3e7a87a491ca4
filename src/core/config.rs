//! Typed application configuration.
//!
//! Loaded from an optional TOML file, with environment variable overrides
//! for the settings that are commonly tuned per deployment.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub models: ModelConfig,
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub tools: ToolCallConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Timeout for buffered generation calls.
    pub generate_timeout_secs: u64,
    /// Timeout for embedding calls.
    pub embed_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_timeout_secs: 30,
            embed_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model used for answer composition.
    pub base_model: String,
    /// Model used for tool intent classification.
    pub tool_model: String,
    /// Model used for embeddings.
    pub embed_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_model: "gemma3:4b".to_string(),
            tool_model: "llama3.2:latest".to_string(),
            embed_model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ragbot.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks fetched per query.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolCallConfig {
    /// Timeout for outbound tool HTTP calls.
    pub call_timeout_secs: u64,
}

impl Default for ToolCallConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks embedded concurrently per batch. Embedding calls are never
    /// fanned out beyond this.
    pub batch_size: usize,
    /// Attempts per chunk before it is reported as failed.
    pub max_attempts: u32,
    /// Base delay for the exponential backoff between attempts, in
    /// milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 20,
            batch_size: 5,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` if it exists, then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            _ => AppConfig::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            self.ollama.base_url = url;
        }
        if let Ok(model) = env::var("BASE_MODEL") {
            self.models.base_model = model;
        }
        if let Ok(model) = env::var("TOOL_MODEL") {
            self.models.tool_model = model;
        }
        if let Ok(model) = env::var("EMBED_MODEL") {
            self.models.embed_model = model;
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.models.tool_model, "llama3.2:latest");
        assert_eq!(config.ingest.chunk_size, 400);
        assert_eq!(config.ingest.chunk_overlap, 20);
        assert_eq!(config.ingest.batch_size, 5);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [models]
            base_model = "llama3.1:8b"

            [retrieval]
            top_k = 8
            "#,
        )
        .expect("valid config");

        assert_eq!(config.models.base_model, "llama3.1:8b");
        assert_eq!(config.models.embed_model, "nomic-embed-text");
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.server.port, 8080);
    }
}
