//! Index and document endpoints over the hosted engine.
//!
//! Writes go through the engine's normal commit path, so every successful
//! call here is also captured by the change feed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, value::RawValue, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Shards per index when the request does not say.
pub const DEFAULT_SHARDS: u32 = 1;

/// Replica copies per shard when the request does not say.
pub const DEFAULT_REPLICAS: u32 = 1;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/indices", get(list_indices))
        .route("/indices/:index", put(create_index).delete(delete_index))
        .route(
            "/indices/:index/:doc_type/:id",
            put(index_document).delete(delete_document),
        )
        .route("/indices/:index/:doc_type/:id/_create", post(create_document))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateIndexRequest {
    pub shards: Option<u32>,
    pub replicas: Option<u32>,
}

/// Result of one document write.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: u64,
    pub result: &'static str,
}

async fn list_indices(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "indices": state.engine.indices() }))
}

async fn create_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    request: Option<Json<CreateIndexRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let shards = request.shards.unwrap_or(DEFAULT_SHARDS);
    let replicas = request.replicas.unwrap_or(DEFAULT_REPLICAS);

    state.engine.create_index(&index, shards, replicas)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "index": index, "shards": shards, "replicas": replicas })),
    ))
}

async fn delete_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<Json<Value>> {
    state.engine.delete_index(&index)?;
    Ok(Json(json!({ "index": index, "deleted": true })))
}

async fn index_document(
    State(state): State<AppState>,
    Path((index, doc_type, id)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Json<WriteResponse>> {
    require_body(&body)?;
    let version = state.engine.index(&index, &doc_type, &id, body)?;
    Ok(Json(WriteResponse {
        index,
        doc_type,
        id,
        version,
        result: "indexed",
    }))
}

async fn create_document(
    State(state): State<AppState>,
    Path((index, doc_type, id)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<WriteResponse>)> {
    require_body(&body)?;
    let version = state.engine.create(&index, &doc_type, &id, body)?;
    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            index,
            doc_type,
            id,
            version,
            result: "created",
        }),
    ))
}

async fn delete_document(
    State(state): State<AppState>,
    Path((index, doc_type, id)): Path<(String, String, String)>,
) -> ApiResult<Json<WriteResponse>> {
    let version = state.engine.delete(&index, &doc_type, &id)?;
    Ok(Json(WriteResponse {
        index,
        doc_type,
        id,
        version,
        result: "deleted",
    }))
}

/// Reject bodies the feed could not embed as `_source`.
fn require_body(body: &Bytes) -> ApiResult<()> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::InvalidRequest("document body is empty".to_string()));
    }
    serde_json::from_slice::<&RawValue>(body)
        .map_err(|e| ApiError::InvalidRequest(format!("document body is not valid JSON: {}", e)))?;
    Ok(())
}
