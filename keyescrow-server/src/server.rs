//! Axum router setup.

use crate::config::ServerConfig;
use crate::handlers::keys;
use crate::storage::KeyStorage;
use axum::routing::{get, patch};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub storage: KeyStorage,
    pub strict_create_state: bool,
}

impl AppState {
    pub fn new(storage: KeyStorage, config: &ServerConfig) -> Self {
        Self {
            storage,
            strict_create_state: config.strict_create_state,
        }
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // `{id}` is the owner's username on GET and the record id on DELETE.
    let api = Router::new()
        .route("/api/keys", get(keys::list_keys).post(keys::create_key))
        .route(
            "/api/keys/{id}",
            get(keys::list_keys_by_owner).delete(keys::delete_key),
        )
        .route("/api/keys/{id}/state", patch(keys::update_key_state));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
