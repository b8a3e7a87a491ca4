use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::bots::BotDirectory;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub bot_id: String,
    pub file_name: String,
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetRequest {
    pub bot_id: String,
    pub file_name: String,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bot = state
        .bots
        .get(&payload.bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bot not found: {}", payload.bot_id)))?;

    let embed_model = bot
        .embed_model
        .as_deref()
        .unwrap_or(&state.config.models.embed_model);
    let source = payload.source.as_deref().unwrap_or("upload");

    let report = state
        .ingestor
        .ingest_text(
            &bot.vector_table,
            embed_model,
            &payload.text,
            &payload.file_name,
            source,
        )
        .await?;

    Ok(Json(report))
}

pub async fn forget(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bot = state
        .bots
        .get(&payload.bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bot not found: {}", payload.bot_id)))?;

    let removed = state
        .vectors
        .delete_by_file_name(&bot.vector_table, &payload.file_name)
        .await?;

    Ok(Json(json!({ "removed": removed })))
}
