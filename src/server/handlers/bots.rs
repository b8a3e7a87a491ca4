use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::bots::{BotDirectory, BotProfile};
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_bots(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let bots = state.bots.list().await?;
    Ok(Json(json!({ "bots": bots })))
}

pub async fn create_bot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BotProfile>,
) -> Result<impl IntoResponse, ApiError> {
    let bot = state.bots.create(payload).await?;
    Ok(Json(bot))
}

pub async fn get_bot(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bot = state
        .bots
        .get(&bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bot not found: {bot_id}")))?;
    Ok(Json(bot))
}

/// Deleting a bot also removes its tools and its knowledge table.
pub async fn delete_bot(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bot = state
        .bots
        .get(&bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bot not found: {bot_id}")))?;

    let tools_removed = state.registry.delete_by_bot(&bot_id).await?;
    state.vectors.drop_table(&bot.vector_table).await?;
    state.bots.delete(&bot_id).await?;

    Ok(Json(json!({
        "deleted": true,
        "toolsRemoved": tools_removed
    })))
}
