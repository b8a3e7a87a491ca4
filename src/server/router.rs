use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{bots, chat, health, knowledge, tools};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/tools", get(tools::list_tools).post(tools::create_tool))
        .route(
            "/api/tools/:tool_id",
            get(tools::get_tool)
                .put(tools::update_tool)
                .delete(tools::delete_tool),
        )
        .route("/api/chat", post(chat::chat))
        .route("/api/streamChat", post(chat::stream_chat))
        .route("/api/bots", get(bots::list_bots).post(bots::create_bot))
        .route(
            "/api/bots/:bot_id",
            get(bots::get_bot).delete(bots::delete_bot),
        )
        .route(
            "/api/knowledge",
            post(knowledge::ingest).delete(knowledge::forget),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
