use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;
use crate::tools::ToolDefinition;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsQuery {
    pub bot_id: String,
}

pub async fn list_tools(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListToolsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tools = state.registry.list_by_bot(&query.bot_id).await?;
    Ok(Json(json!({ "tools": tools })))
}

pub async fn get_tool(
    State(state): State<Arc<AppState>>,
    Path(tool_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tool = state
        .registry
        .get(&tool_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tool not found: {tool_id}")))?;
    Ok(Json(tool))
}

pub async fn create_tool(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ToolDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    let tool = state.registry.create(payload).await?;
    Ok(Json(tool))
}

pub async fn update_tool(
    State(state): State<Arc<AppState>>,
    Path(tool_id): Path<String>,
    Json(payload): Json<ToolDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    let tool = state.registry.update(&tool_id, payload).await?;
    Ok(Json(tool))
}

pub async fn delete_tool(
    State(state): State<Arc<AppState>>,
    Path(tool_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.registry.delete(&tool_id).await? {
        return Err(ApiError::NotFound(format!("Tool not found: {tool_id}")));
    }
    Ok(Json(json!({ "deleted": true })))
}
