// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport surface.

pub mod auth;
pub mod http;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::HubState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Publish (A2P)
        .route("/publish", post(http::publish_message))
        // History: range listing + gap fill
        .route("/messages", get(http::history_query))
        // Permission admin
        .route(
            "/permissions",
            post(http::grant_permission)
                .delete(http::revoke_permission)
                .get(http::list_permissions),
        )
        // Telemetry ingest
        .route("/metrics", post(http::ingest_metrics))
        // Dead-letter inspection
        .route("/deadletters", get(http::list_dead_letters))
        // Session handshake (auth via query token)
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
