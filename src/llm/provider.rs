use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::GenerateRequest;
use crate::core::errors::ApiError;

/// Generative-model backend used for classification, composition and
/// embeddings. Implementations must apply finite transport timeouts.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "ollama").
    fn name(&self) -> &str;

    /// Buffered generation: a single prompt in, the full response text out.
    async fn generate(&self, request: GenerateRequest) -> Result<String, ApiError>;

    /// Streaming generation. Tokens arrive on the channel as the backend
    /// emits them; the channel closes when the backend signals completion.
    /// A transport failure mid-stream is delivered as a final `Err` item.
    ///
    /// Dropping the receiver stops the upstream read.
    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// Embed a single text.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ApiError>;
}
