// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the router.

pub mod admin;
pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::RouterState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<RouterState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Agent lifecycle
        .route("/agents/register", post(http::register))
        .route("/admin/agents/pending", get(admin::agents_pending))
        .route("/admin/agents/approved", get(admin::agents_approved))
        .route("/admin/agents/approve", post(admin::agents_approve))
        .route("/admin/agents/reject", post(admin::agents_reject))
        // Event ingest + pull fallback
        .route("/mcp/events/publish", post(http::publish))
        .route("/mcp/sessions/{session_key}/events", get(http::session_events))
        // Admin authentication
        .route("/admin/login", post(admin::login))
        .route("/admin/logout", post(admin::logout))
        .route("/admin/session", get(admin::session))
        // Admin reporting
        .route("/admin/api/metrics", get(admin::metrics))
        .route("/admin/api/sessions", get(admin::sessions))
        .route("/admin/api/loops", get(admin::loops))
        .route("/admin/api/deliveries", get(admin::deliveries))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::admin_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
