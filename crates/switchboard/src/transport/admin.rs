// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin surface: registration approvals, session login, and read-only
//! reporting over the audit sink.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::registry::Registration;
use crate::state::RouterState;
use crate::transport::auth::{admin_token, constant_time_eq, ADMIN_COOKIE};

/// How many rows the recent-slice reporting routes return.
const REPORT_SLICE: usize = 50;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub agent_id: String,
    #[serde(default)]
    pub session_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    #[serde(flatten)]
    pub registration: Registration,
    pub session_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
}

// -- Registration lifecycle ---------------------------------------------------

/// `GET /admin/agents/pending`
pub async fn agents_pending(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(s.registry.pending().await)
}

/// `GET /admin/agents/approved`
pub async fn agents_approved(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    let mut views = Vec::new();
    for registration in s.registry.approved().await {
        let session_keys = s.registry.grants_for(&registration.agent_id).await;
        views.push(AgentView { registration, session_keys });
    }
    Json(views)
}

/// `POST /admin/agents/approve` — approve + grant session keys.
pub async fn agents_approve(
    State(s): State<Arc<RouterState>>,
    Json(req): Json<ApproveRequest>,
) -> impl IntoResponse {
    match s.registry.approve(&req.agent_id, req.session_keys).await {
        Ok(registration) => {
            tracing::info!(agent = %registration.agent_id, "agent approved");
            let session_keys = s.registry.grants_for(&registration.agent_id).await;
            Json(AgentView { registration, session_keys }).into_response()
        }
        Err(e) => e.to_http_response("no registration for that agentId").into_response(),
    }
}

/// `POST /admin/agents/reject`
pub async fn agents_reject(
    State(s): State<Arc<RouterState>>,
    Json(req): Json<RejectRequest>,
) -> impl IntoResponse {
    match s.registry.reject(&req.agent_id).await {
        Ok(registration) => {
            tracing::info!(agent = %registration.agent_id, "agent rejected");
            Json(registration).into_response()
        }
        Err(e) => e.to_http_response("no registration for that agentId").into_response(),
    }
}

// -- Admin authentication -----------------------------------------------------

/// `POST /admin/login` — password -> HttpOnly session cookie.
pub async fn login(
    State(s): State<Arc<RouterState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let Some(ref expected) = s.config.admin_password else {
        return RouterError::BadRequest
            .to_http_response("admin password not configured")
            .into_response();
    };
    if !constant_time_eq(&req.password, expected) {
        return RouterError::Unauthorized.to_http_response("invalid password").into_response();
    }

    let token = s.create_admin_session().await;
    let cookie = format!("{ADMIN_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax");
    (
        StatusCode::OK,
        [(axum::http::header::SET_COOKIE, cookie)],
        Json(LoginResponse { ok: true }),
    )
        .into_response()
}

/// `POST /admin/logout`
pub async fn logout(State(s): State<Arc<RouterState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = admin_token(&headers) {
        s.revoke_admin_session(&token).await;
    }
    let cookie = format!("{ADMIN_COOKIE}=; HttpOnly; Path=/; Max-Age=0");
    (StatusCode::OK, [(axum::http::header::SET_COOKIE, cookie)], Json(LoginResponse { ok: true }))
        .into_response()
}

/// `GET /admin/session` — reports authentication state, never 401.
pub async fn session(State(s): State<Arc<RouterState>>, headers: HeaderMap) -> impl IntoResponse {
    let authenticated = crate::transport::auth::admin_authorized(&s, &headers).await;
    Json(SessionResponse { authenticated })
}

// -- Reporting ----------------------------------------------------------------

/// `GET /admin/api/metrics` — aggregate totals from the audit sink.
pub async fn metrics(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(s.audit.totals())
}

/// `GET /admin/api/sessions` — per-session rollup.
pub async fn sessions(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(s.audit.session_rollup())
}

/// `GET /admin/api/loops` — recent loop decisions.
pub async fn loops(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(s.audit.recent_decisions(REPORT_SLICE))
}

/// `GET /admin/api/deliveries` — recent delivery attempts.
pub async fn deliveries(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(s.audit.recent_deliveries(REPORT_SLICE))
}
