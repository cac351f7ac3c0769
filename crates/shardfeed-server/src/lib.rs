//! shardfeed server - live change feed over WebSocket.
//!
//! This crate hosts an in-memory sharded engine, taps its shards with the
//! core broadcaster, and exposes:
//! - `GET /ws` for change subscribers
//! - `/indices/...` document writes that feed the capture pipeline
//! - `GET /health` and `GET /stats`

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::{Args, FeedConfig};
pub use error::Error;
pub use server::FeedServer;
pub use state::AppState;

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check and counters
        .merge(routes::health::routes())
        // Index and document writes
        .merge(routes::documents::routes())
        // Change subscribers
        .route(config::WS_PATH, get(ws::ws_changes))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
