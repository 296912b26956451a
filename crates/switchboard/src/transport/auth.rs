// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::RouterError;
use crate::state::RouterState;

/// Cookie name carrying the admin session token.
pub const ADMIN_COOKIE: &str = "switchboard_admin";

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Pull the admin session token from the request: the session cookie, or
/// a Bearer authorization header.
pub fn admin_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get("cookie").and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            let pair = pair.trim();
            if let Some(value) = pair.strip_prefix(ADMIN_COOKIE) {
                if let Some(token) = value.strip_prefix('=') {
                    if !token.is_empty() {
                        return Some(token.to_owned());
                    }
                }
            }
        }
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// True iff the request carries a live admin session.
pub async fn admin_authorized(state: &RouterState, headers: &HeaderMap) -> bool {
    if state.config.admin_password.is_none() {
        return true;
    }
    match admin_token(headers) {
        Some(token) => state.admin_session_valid(&token).await,
        None => false,
    }
}

/// Axum middleware guarding the admin surface.
///
/// Exempt: `/admin/login` (how a session is obtained) and `/admin/session`
/// (reports authentication state without failing). Everything else under
/// `/admin/` requires a live session unless `ADMIN_PASSWORD` is unset.
pub async fn admin_layer(
    state: State<Arc<RouterState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !path.starts_with("/admin/") || path == "/admin/login" || path == "/admin/session" {
        return next.run(req).await;
    }

    if !admin_authorized(&state, req.headers()).await {
        let body = crate::error::ErrorResponse {
            error: RouterError::Unauthorized.to_error_body("admin session required"),
        };
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
