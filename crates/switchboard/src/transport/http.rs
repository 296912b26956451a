// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the agent-facing surface: registration, publish,
//! pull fallback, and health.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, RawEnvelope};
use crate::error::{RejectionResponse, RouterError};
use crate::guard::Decision;
use crate::ingest::{self, PublishResult};
use crate::registry::{RegisterRequest, Registration};
use crate::state::RouterState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub registered: bool,
    pub registration: Registration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delayed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventsResponse {
    pub session_key: String,
    pub events: Vec<Envelope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub stats: HealthStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStats {
    pub sessions: usize,
    pub events: u64,
    pub approved_agents: usize,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health(State(s): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        stats: HealthStats {
            sessions: s.store.session_count().await,
            events: s.store.event_count().await,
            approved_agents: s.registry.approved_count().await,
        },
    })
}

/// `POST /agents/register` — create a pending registration.
pub async fn register(
    State(s): State<Arc<RouterState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    match s.registry.register(req).await {
        Ok(registration) => {
            tracing::info!(agent = %registration.agent_id, "agent registered, pending approval");
            (
                StatusCode::ACCEPTED,
                Json(RegisterResponse { registered: true, registration }),
            )
                .into_response()
        }
        Err(fields) => {
            RejectionResponse::bad_request("registration failed validation", fields).into_response()
        }
    }
}

/// `POST /mcp/events/publish` — ingest one event.
pub async fn publish(
    State(s): State<Arc<RouterState>>,
    Json(raw): Json<RawEnvelope>,
) -> impl IntoResponse {
    match ingest::publish(&s, raw).await {
        PublishResult::Invalid(fields) => RejectionResponse::invalid_envelope(fields).into_response(),
        PublishResult::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(PublishResponse {
                accepted: false,
                reason: Some("agent not approved for this session".to_owned()),
                event_id: None,
                delayed: None,
                delay_ms: None,
                stopped: None,
                decision: None,
            }),
        )
            .into_response(),
        PublishResult::DuplicateEmitted => Json(PublishResponse {
            accepted: false,
            reason: Some("self-echo duplicate emittedEventId blocked".to_owned()),
            event_id: None,
            delayed: None,
            delay_ms: None,
            stopped: None,
            decision: None,
        })
        .into_response(),
        PublishResult::Stopped { decision } => Json(PublishResponse {
            accepted: false,
            stopped: Some(true),
            decision: Some(decision),
            event_id: None,
            delayed: None,
            delay_ms: None,
            reason: None,
        })
        .into_response(),
        PublishResult::Accepted { event_id, delay_ms, decision } => Json(PublishResponse {
            accepted: true,
            event_id: Some(event_id),
            delayed: Some(delay_ms > 0),
            delay_ms: Some(delay_ms),
            decision: Some(decision),
            stopped: None,
            reason: None,
        })
        .into_response(),
    }
}

/// `GET /mcp/sessions/{sessionKey}/events?agentId=` — pull fallback for
/// agents without a reachable callback. Requires approval for the session.
pub async fn session_events(
    State(s): State<Arc<RouterState>>,
    Path(session_key): Path<String>,
    Query(query): Query<PullQuery>,
) -> impl IntoResponse {
    let Some(agent_id) = query.agent_id.filter(|id| !id.is_empty()) else {
        return RouterError::BadRequest
            .to_http_response("agentId query parameter is required")
            .into_response();
    };
    if !s.registry.can_access(&agent_id, &session_key).await {
        return RouterError::Forbidden
            .to_http_response("agent not approved for this session")
            .into_response();
    }
    let events = s.store.list(&session_key).await;
    Json(SessionEventsResponse { session_key, events }).into_response()
}
