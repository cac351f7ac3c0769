//! Health and statistics endpoints.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use shardfeed_core::FeedState;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let feed_state = match state.broadcaster.state() {
        FeedState::Created => "created",
        FeedState::Listening => "listening",
    };

    Json(json!({
        "status": "healthy",
        "service": "shardfeed-server",
        "version": env!("CARGO_PKG_VERSION"),
        "feed": feed_state,
        "subscribers": state.registry().len(),
        "primary_shard_only": state.config.primary_shard_only,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let rules: Vec<String> = state
        .broadcaster
        .sources()
        .rules()
        .iter()
        .map(ToString::to_string)
        .collect();

    Json(json!({
        "subscribers": state.registry().len(),
        "rules": rules,
        "indices": state.engine.indices(),
        "metrics": state.metrics().snapshot(),
    }))
}
