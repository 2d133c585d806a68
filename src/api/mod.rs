//! HTTP ingress for the bridge
//!
//! One webhook endpoint receiving message batches from the upstream gateway,
//! a liveness endpoint, and permissive CORS for preflight requests.

pub mod health;
pub mod sync;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ingest::{HandoffQueue, LoginWatch, MessageDedup};

/// Request body size ceiling (5 MB)
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Shared state for ingress handlers
#[derive(Debug)]
pub struct ApiState {
    /// Local account identity; the webhook path is scoped to it
    pub account_id: String,
    pub dedup: MessageDedup,
    pub queue: HandoffQueue,
    pub login: LoginWatch,
}

/// Build the ingress router
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/msg/SyncMessage/{account_id}", post(sync::handle_batch))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
