//! Chat orchestration: tool branch first, retrieval fallback second.
//!
//! A failure anywhere in the tool branch is absorbed and the request falls
//! through to vector retrieval; only retrieval and malformed-bot-state
//! failures surface to the caller. Steps within one request are strictly
//! sequential.

use std::sync::Arc;

use serde::Serialize;

use super::composer::{format_chunks, AnswerComposer};
use crate::bots::{BotDirectory, BotProfile};
use crate::core::config::{ModelConfig, RetrievalConfig};
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;
use crate::rag::VectorStore;
use crate::tools::{ToolDetector, ToolExecutor, ToolInvocation, ToolOutcome};

pub const NO_CONTEXT_MESSAGE: &str =
    "No relevant information found. Please try a different question.";

/// The single output contract for both the tool branch and retrieval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_tool_response: bool,
    pub tool_used: Option<String>,
}

impl ChatAnswer {
    fn tool(answer: String, tool_name: &str) -> Self {
        Self {
            success: true,
            answer: Some(answer),
            message: None,
            is_tool_response: true,
            tool_used: Some(tool_name.to_string()),
        }
    }

    fn retrieval(answer: String) -> Self {
        Self {
            success: true,
            answer: Some(answer),
            message: None,
            is_tool_response: false,
            tool_used: None,
        }
    }

    fn no_context() -> Self {
        Self {
            success: false,
            answer: None,
            message: Some(NO_CONTEXT_MESSAGE.to_string()),
            is_tool_response: false,
            tool_used: None,
        }
    }
}

pub struct ChatOrchestrator {
    bots: Arc<dyn BotDirectory>,
    detector: ToolDetector,
    executor: ToolExecutor,
    composer: AnswerComposer,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    models: ModelConfig,
    retrieval: RetrievalConfig,
}

impl ChatOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bots: Arc<dyn BotDirectory>,
        detector: ToolDetector,
        executor: ToolExecutor,
        composer: AnswerComposer,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmProvider>,
        models: ModelConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            bots,
            detector,
            executor,
            composer,
            vectors,
            llm,
            models,
            retrieval,
        }
    }

    pub async fn answer(&self, bot_id: &str, question: &str) -> Result<ChatAnswer, ApiError> {
        let bot = self
            .bots
            .get(bot_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Bot not found: {bot_id}")))?;

        // Step 1: tool branch. Everything here is best-effort.
        let tool_model = bot.tool_model.as_deref();
        if let Some(invocation) = self.detector.detect(bot_id, question, tool_model).await? {
            match self.run_tool_branch(&bot, &invocation, question).await {
                Ok(answer) => return Ok(answer),
                Err(err) => {
                    tracing::error!(
                        tool_id = %invocation.tool_id,
                        "Tool execution failed, falling back to retrieval: {err}"
                    );
                }
            }
        }

        // Step 2: vector retrieval.
        self.answer_from_retrieval(&bot, question).await
    }

    async fn run_tool_branch(
        &self,
        bot: &BotProfile,
        invocation: &ToolInvocation,
        question: &str,
    ) -> Result<ChatAnswer, ApiError> {
        let outcome = self
            .executor
            .execute(&invocation.tool_id, &invocation.args)
            .await?;

        let output = match outcome {
            ToolOutcome::Success(value) => value,
            ToolOutcome::Failed(payload) => {
                return Err(ApiError::Upstream(payload.to_string()));
            }
        };

        let context = serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string());
        let model = bot.base_model.as_deref().unwrap_or(&self.models.base_model);
        let answer = self
            .composer
            .compose(
                model,
                question,
                &context,
                invocation.system_prompt.as_deref(),
            )
            .await?;

        Ok(ChatAnswer::tool(answer, &invocation.tool_name))
    }

    async fn answer_from_retrieval(
        &self,
        bot: &BotProfile,
        question: &str,
    ) -> Result<ChatAnswer, ApiError> {
        let chunks = self.retrieve(bot, question).await?;
        if chunks.is_empty() {
            return Ok(ChatAnswer::no_context());
        }

        let context = format_chunks(&chunks);
        let model = bot.base_model.as_deref().unwrap_or(&self.models.base_model);
        let answer = self
            .composer
            .compose(model, question, &context, bot.instruction.as_deref())
            .await?;

        Ok(ChatAnswer::retrieval(answer))
    }

    /// Shared by the buffered and streaming chat surfaces.
    pub async fn retrieve(
        &self,
        bot: &BotProfile,
        question: &str,
    ) -> Result<Vec<crate::rag::RetrievedChunk>, ApiError> {
        if bot.vector_table.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Bot {} has no vector table configured",
                bot.bot_id
            )));
        }

        let embed_model = bot
            .embed_model
            .as_deref()
            .unwrap_or(&self.models.embed_model);
        let embedding = self.llm.embed(question, embed_model).await?;

        self.vectors
            .search(&bot.vector_table, &embedding, self.retrieval.top_k)
            .await
    }
}
