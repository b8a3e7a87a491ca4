use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::bots::BotDirectory;
use crate::chat::orchestrator::NO_CONTEXT_MESSAGE;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    pub bot_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChatRequest {
    #[serde(default)]
    pub question: Option<String>,
    /// Accepted as an alias for `question`.
    #[serde(default)]
    pub prompt: Option<String>,
    pub bot_id: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question is required".to_string()));
    }
    let answer = state
        .orchestrator
        .answer(&payload.bot_id, &payload.question)
        .await?;
    Ok(Json(answer))
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

enum SsePhase {
    Tokens(mpsc::Receiver<Result<String, ApiError>>),
    Done,
}

fn token_event(text: &str) -> Event {
    Event::default().data(json!({ "text": text }).to_string())
}

fn end_event() -> Event {
    Event::default().event("end").data("")
}

/// Retrieval-only streaming surface. Failures before the first byte surface
/// as HTTP errors; failures mid-stream arrive as an in-band `error` event.
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StreamChatRequest>,
) -> Result<Sse<EventStream>, ApiError> {
    let question = payload
        .question
        .or(payload.prompt)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("question is required".to_string()))?;

    let bot = state
        .bots
        .get(&payload.bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bot not found: {}", payload.bot_id)))?;

    let chunks = state.orchestrator.retrieve(&bot, &question).await?;

    let events: EventStream = if chunks.is_empty() {
        stream::iter(vec![Ok(token_event(NO_CONTEXT_MESSAGE)), Ok(end_event())]).boxed()
    } else {
        let model = bot
            .base_model
            .clone()
            .unwrap_or_else(|| state.config.models.base_model.clone());
        let rx = state
            .composer
            .stream_markdown(&model, &question, &chunks)
            .await?;

        stream::unfold(SsePhase::Tokens(rx), |phase| async move {
            match phase {
                SsePhase::Tokens(mut rx) => match rx.recv().await {
                    Some(Ok(token)) => Some((Ok(token_event(&token)), SsePhase::Tokens(rx))),
                    Some(Err(err)) => {
                        let event = Event::default()
                            .event("error")
                            .data(json!({ "error": err.to_string() }).to_string());
                        Some((Ok(event), SsePhase::Done))
                    }
                    None => Some((Ok(end_event()), SsePhase::Done)),
                },
                SsePhase::Done => None,
            }
        })
        .boxed()
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
