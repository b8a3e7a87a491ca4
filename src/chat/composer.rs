//! Answer composition: turn tool output or retrieved chunks into a final
//! natural-language answer.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::{GenerateRequest, LlmProvider};
use crate::rag::RetrievedChunk;

pub struct AnswerComposer {
    llm: Arc<dyn LlmProvider>,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Buffered composition, grounded strictly in the supplied context.
    pub async fn compose(
        &self,
        model: &str,
        query: &str,
        context: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, ApiError> {
        let prompt = answer_prompt(query, context, system_prompt);

        match self.llm.generate(GenerateRequest::new(model, prompt)).await {
            Ok(answer) if !answer.is_empty() => Ok(answer),
            Ok(_) => Err(ApiError::Upstream(
                "model returned an empty answer".to_string(),
            )),
            Err(err) => {
                tracing::error!(
                    query_len = query.len(),
                    context_len = context.len(),
                    "Answer generation failed: {err}"
                );
                Err(err)
            }
        }
    }

    /// Streaming Markdown composition over retrieved chunks. Tokens are
    /// forwarded on the channel as the backend emits them.
    pub async fn stream_markdown(
        &self,
        model: &str,
        question: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let context = format_chunks(chunks);
        let prompt = markdown_prompt(question, &context);
        let request = GenerateRequest::new(model, prompt).with_temperature(0.7);

        self.llm.stream_generate(request).await
    }
}

/// Retrieved chunks concatenated with stable source labels.
pub fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("### Context Source {}\n{}", i + 1, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_prompt(query: &str, context: &str, system_prompt: Option<&str>) -> String {
    format!(
        "Answer the following question using only the context below. If the context does not contain the answer, say \"I don't know.\"\n\
         \n{}\n\
         Context:\n{}\n\
         \nQuestion:\n{}\n\
         \nAnswer:\n",
        system_prompt.unwrap_or_default(),
        context,
        query
    )
}

fn markdown_prompt(question: &str, context: &str) -> String {
    format!(
        "Respond using Markdown formatting with:\n\
         - **Bold** for key terms\n\
         - `code` for technical concepts\n\
         - Lists for steps\n\
         - Tables for comparisons\n\
         \nContext:\n{}\n\
         \nQuestion:\n{}\n\
         \nAnswer (in Markdown):\n",
        context, question
    )
}
