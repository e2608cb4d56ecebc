// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the relay hub.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::AppState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    Router::new()
        // Liveness (no auth)
        .route("/health", get(http::liveness))
        // Connections (token via query)
        .route("/ws", get(ws::ws_handler))
        .route("/api/v1/agents", get(http::list_agents))
        // Uploads; batches are streamed to disk so the body is not capped
        .route("/upload", post(http::upload).layer(DefaultBodyLimit::disable()))
        .route("/upload/request", post(http::upload_request))
        // Health reports
        .route("/health/check", get(http::health_check_query).post(http::health_check_body))
        .route("/health/records", get(http::health_records))
        .route("/health/records/{id}", get(http::health_record))
        .fallback(http::not_found)
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(trace_layer)
        .with_state(state)
}
